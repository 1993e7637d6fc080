//! Frame codec: logical messages to fixed-size packets
//!
//! ```text
//! byte 0   control   bit7 flip | bit6 ack-request | bits5..0 payload length
//! byte 1   index     high nibble packet index | low nibble (total - 1)
//! byte 2.. payload   first packet: cmd LE16, len LE16, data...
//! ```

use std::fmt;

use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{FramingError, ProtocolError};
use crate::protocol::{control, PACKET_HEADER_SIZE, PACKET_PAYLOAD_SIZE, PACKET_SIZE, SUB_HEADER_SIZE};
use crate::types::{FlipBit, Message};

/// Per-packet framing header
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PacketHeader {
    pub control: u8,
    pub index: u8,
}

/// Message sub-header at the start of the first packet's payload
#[derive(Debug, Clone, Copy, IntoBytes, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SubHeader {
    command: U16,
    length: U16,
}

impl SubHeader {
    pub fn new(command: u16, length: u16) -> Self {
        Self {
            command: U16::new(command),
            length: U16::new(length),
        }
    }

    pub fn command(&self) -> u16 {
        self.command.get()
    }

    pub fn length(&self) -> u16 {
        self.length.get()
    }

    /// Parse from the first four payload bytes of a first packet
    pub fn parse(payload: &[u8]) -> Result<Self, FramingError> {
        let bytes = payload.get(..SUB_HEADER_SIZE).ok_or(FramingError::Truncated {
            len: payload.len(),
            needed: SUB_HEADER_SIZE,
        })?;
        Self::read_from_bytes(bytes).map_err(|_| FramingError::Truncated {
            len: payload.len(),
            needed: SUB_HEADER_SIZE,
        })
    }
}

/// One 64-byte wire packet
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    buf: [u8; PACKET_SIZE],
}

impl Packet {
    fn build(control: u8, index: u8, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= PACKET_PAYLOAD_SIZE);
        let mut buf = [0u8; PACKET_SIZE];
        let header = PacketHeader {
            control: control | payload.len() as u8,
            index,
        };
        buf[..PACKET_HEADER_SIZE].copy_from_slice(header.as_bytes());
        buf[PACKET_HEADER_SIZE..PACKET_HEADER_SIZE + payload.len()].copy_from_slice(payload);
        Self { buf }
    }

    /// Parse a packet read from the transport.
    ///
    /// Input may be shorter than 64 bytes, but must hold the header and the
    /// payload length it declares.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FramingError> {
        let (header, _) =
            PacketHeader::read_from_prefix(bytes).map_err(|_| FramingError::Truncated {
                len: bytes.len(),
                needed: PACKET_HEADER_SIZE,
            })?;
        let payload_len = (header.control & control::LENGTH_MASK) as usize;
        let needed = PACKET_HEADER_SIZE + payload_len;
        if payload_len > PACKET_PAYLOAD_SIZE || bytes.len() < needed {
            return Err(FramingError::Truncated {
                len: bytes.len(),
                needed,
            });
        }

        let mut buf = [0u8; PACKET_SIZE];
        let copy = bytes.len().min(PACKET_SIZE);
        buf[..copy].copy_from_slice(&bytes[..copy]);
        Ok(Self { buf })
    }

    pub fn header(&self) -> PacketHeader {
        PacketHeader {
            control: self.buf[0],
            index: self.buf[1],
        }
    }

    pub fn control(&self) -> u8 {
        self.buf[0]
    }

    pub fn flip_bit(&self) -> FlipBit {
        FlipBit::from_control(self.buf[0])
    }

    pub fn ack_requested(&self) -> bool {
        self.buf[0] & control::ACK_REQUEST != 0
    }

    /// Set or clear the ack-request flag
    pub fn set_ack_request(&mut self, on: bool) {
        if on {
            self.buf[0] |= control::ACK_REQUEST;
        } else {
            self.buf[0] &= !control::ACK_REQUEST;
        }
    }

    pub fn payload_len(&self) -> usize {
        (self.buf[0] & control::LENGTH_MASK) as usize
    }

    /// Zero-based index of this packet in its stream
    pub fn index(&self) -> u8 {
        self.buf[1] >> 4
    }

    /// Total packets in the stream this packet belongs to
    pub fn total(&self) -> u8 {
        (self.buf[1] & 0x0F) + 1
    }

    pub fn is_last(&self) -> bool {
        self.index() + 1 == self.total()
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[PACKET_HEADER_SIZE..PACKET_HEADER_SIZE + self.payload_len()]
    }

    /// Header plus declared payload; the bytes a device echo must reproduce
    pub fn framed_bytes(&self) -> &[u8] {
        &self.buf[..PACKET_HEADER_SIZE + self.payload_len()]
    }

    /// Full fixed-size packet as written to the transport
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("flip", &self.flip_bit())
            .field("ack", &self.ack_requested())
            .field("index", &self.index())
            .field("total", &self.total())
            .field("payload", &format_args!("{:02X?}", self.payload()))
            .finish()
    }
}

/// The ordered packets of one encoded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketStream {
    flip: FlipBit,
    packets: Vec<Packet>,
}

impl PacketStream {
    pub fn flip_bit(&self) -> FlipBit {
        self.flip
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Packet> {
        self.packets.iter()
    }

    pub fn into_packets(self) -> Vec<Packet> {
        self.packets
    }
}

impl<'a> IntoIterator for &'a PacketStream {
    type Item = &'a Packet;
    type IntoIter = std::slice::Iter<'a, Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.iter()
    }
}

/// Number of packets needed for a payload of `payload_len` bytes
pub fn packets_needed(payload_len: usize) -> usize {
    (SUB_HEADER_SIZE + payload_len).div_ceil(PACKET_PAYLOAD_SIZE)
}

/// Encode a message into its packet stream.
///
/// `flip` is sampled, never advanced here: retransmissions of the same stream
/// keep their bit. With `ack_request` every packet carries the ack flag.
pub fn encode(
    message: &Message,
    flip: FlipBit,
    ack_request: bool,
) -> Result<PacketStream, ProtocolError> {
    let count = packets_needed(message.len());
    if !message.fits() {
        return Err(ProtocolError::OversizeMessage {
            payload_len: message.len(),
            packets: count,
        });
    }

    let mut serialized = Vec::with_capacity(SUB_HEADER_SIZE + message.len());
    serialized.extend_from_slice(SubHeader::new(message.command(), message.len() as u16).as_bytes());
    serialized.extend_from_slice(message.payload());

    let mut control = flip.bits();
    if ack_request {
        control |= control::ACK_REQUEST;
    }
    let last = (count - 1) as u8;

    let packets = serialized
        .chunks(PACKET_PAYLOAD_SIZE)
        .enumerate()
        .map(|(i, chunk)| Packet::build(control, ((i as u8) << 4) | last, chunk))
        .collect();

    Ok(PacketStream { flip, packets })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{cmd, MAX_MESSAGE_PAYLOAD};

    #[test]
    fn test_single_packet_layout() {
        let msg = Message::new(cmd::PING, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let stream = encode(&msg, FlipBit::Clear, false).unwrap();
        assert_eq!(stream.len(), 1);
        let p = &stream.packets()[0];
        assert_eq!(
            p.framed_bytes(),
            &[0x08, 0x00, 0x01, 0x00, 0x04, 0x00, 0xDE, 0xAD, 0xBE, 0xEF]
        );
        assert_eq!(p.as_bytes().len(), PACKET_SIZE);
        assert!(p.as_bytes()[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flip_and_ack_on_every_packet() {
        let msg = Message::new(0x0042, vec![0x55; 150]);
        let stream = encode(&msg, FlipBit::Set, true).unwrap();
        // 154 serialized bytes -> 62 + 62 + 30
        assert_eq!(stream.len(), 3);
        for (i, p) in stream.iter().enumerate() {
            assert_eq!(p.flip_bit(), FlipBit::Set);
            assert!(p.ack_requested());
            assert_eq!(p.index() as usize, i);
            assert_eq!(p.total(), 3);
        }
        assert_eq!(stream.packets()[0].control(), 0x80 | 0x40 | 62);
        assert_eq!(stream.packets()[2].payload_len(), 30);
        assert_eq!(stream.packets()[2].header().index, 0x22);
    }

    #[test]
    fn test_empty_payload_is_one_packet() {
        let stream = encode(&Message::empty(cmd::GET_DEVICE_STATUS), FlipBit::Clear, false).unwrap();
        assert_eq!(stream.len(), 1);
        assert_eq!(stream.packets()[0].payload(), &[0x11, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_oversize_boundary() {
        let max = Message::new(1, vec![0; MAX_MESSAGE_PAYLOAD]);
        assert_eq!(encode(&max, FlipBit::Clear, false).unwrap().len(), 16);

        let over = Message::new(1, vec![0; MAX_MESSAGE_PAYLOAD + 1]);
        assert!(matches!(
            encode(&over, FlipBit::Clear, false),
            Err(ProtocolError::OversizeMessage {
                payload_len: 989,
                packets: 17
            })
        ));
    }

    #[test]
    fn test_packet_from_bytes_rejects_truncation() {
        assert!(matches!(
            Packet::from_bytes(&[0x05]),
            Err(FramingError::Truncated { len: 1, needed: 2 })
        ));
        assert!(matches!(
            Packet::from_bytes(&[0x05, 0x00, 1, 2]),
            Err(FramingError::Truncated { len: 4, needed: 7 })
        ));
        // Length field 63 can never fit a 64-byte packet
        let mut raw = [0u8; PACKET_SIZE];
        raw[0] = 0x3F;
        assert!(Packet::from_bytes(&raw).is_err());
    }

    #[test]
    fn test_set_ack_request() {
        let msg = Message::new(cmd::PING, vec![1]);
        let mut p = encode(&msg, FlipBit::Set, false).unwrap().into_packets().remove(0);
        p.set_ack_request(true);
        assert_eq!(p.control(), 0x80 | 0x40 | 5);
        p.set_ack_request(false);
        assert_eq!(p.control(), 0x80 | 5);
    }
}
