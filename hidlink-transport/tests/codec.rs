use hidlink_transport::{decode_stream, encode, packets_needed, FlipBit, Message};
use proptest::prelude::*;

proptest! {
    #[test]
    fn stream_reassembles_to_original(
        command in any::<u16>(),
        payload in prop::collection::vec(any::<u8>(), 0..=988),
        flip in any::<bool>(),
        ack in any::<bool>(),
    ) {
        let flip = if flip { FlipBit::Set } else { FlipBit::Clear };
        let message = Message::new(command, payload);
        let stream = encode(&message, flip, ack).unwrap();

        prop_assert_eq!(stream.len(), packets_needed(message.len()));
        for (i, packet) in stream.iter().enumerate() {
            prop_assert_eq!(packet.index() as usize, i);
            prop_assert_eq!(packet.total() as usize, stream.len());
            prop_assert_eq!(packet.flip_bit(), flip);
            prop_assert_eq!(packet.ack_requested(), ack);
        }
        prop_assert_eq!(decode_stream(&stream).unwrap(), message);
    }
}
