//! Reassembly state machine: packets back into messages
//!
//! The core [`Reassembler`] is command-agnostic. Reserved commands (debug
//! text, retry requests) are interpreted afterwards by `dispatch`, and
//! [`consume`] ties both to a transport.

use std::time::Duration;

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::codec::{Packet, SubHeader};
use crate::debug_text::{self, DebugSink};
use crate::error::{FramingError, ProtocolError};
use crate::protocol::{cmd, ReservedCommands, SUB_HEADER_SIZE};
use crate::types::Message;
use crate::Transport;

#[derive(Debug, Clone, Copy)]
enum State {
    /// Next packet must open a stream (index 0, carries the sub-header)
    AwaitFirstPacket,
    /// Sub-header parsed, appending continuation packets
    Accumulating {
        command: u16,
        length: u16,
        total: u8,
        next_index: u8,
    },
}

/// Rebuilds one message from its packet stream.
///
/// Completion is declared by the packets themselves: every packet restates
/// the stream length, and the stream ends at index `total - 1`.
#[derive(Debug)]
pub struct Reassembler {
    state: State,
    data: Vec<u8>,
    /// Sum of per-packet payload lengths, sub-header included
    carried: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            state: State::AwaitFirstPacket,
            data: Vec::new(),
            carried: 0,
        }
    }

    /// True when no stream is partially received
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::AwaitFirstPacket)
    }

    /// Drop any partial stream
    pub fn reset(&mut self) {
        self.state = State::AwaitFirstPacket;
        self.data.clear();
        self.carried = 0;
    }

    /// Feed one packet. Returns the message once its last packet arrives.
    ///
    /// On error the partial stream is discarded and the reassembler is ready
    /// for a new stream.
    pub fn push(&mut self, packet: &Packet) -> Result<Option<Message>, FramingError> {
        let result = self.push_inner(packet);
        if !matches!(result, Ok(None)) {
            self.reset();
        }
        result
    }

    fn push_inner(&mut self, packet: &Packet) -> Result<Option<Message>, FramingError> {
        let (command, length) = match self.state {
            State::AwaitFirstPacket => {
                if packet.index() != 0 {
                    return Err(FramingError::UnexpectedIndex {
                        expected: 0,
                        got: packet.index(),
                    });
                }
                let sub = SubHeader::parse(packet.payload())?;
                self.data
                    .extend_from_slice(&packet.payload()[SUB_HEADER_SIZE..]);
                (sub.command(), sub.length())
            }
            State::Accumulating {
                command,
                length,
                total,
                next_index,
            } => {
                if packet.total() != total {
                    return Err(FramingError::InconsistentStreamLength {
                        expected: total,
                        got: packet.total(),
                    });
                }
                if packet.index() != next_index {
                    return Err(FramingError::UnexpectedIndex {
                        expected: next_index,
                        got: packet.index(),
                    });
                }
                self.data.extend_from_slice(packet.payload());
                (command, length)
            }
        };
        self.carried += packet.payload_len();

        if !packet.is_last() {
            self.state = State::Accumulating {
                command,
                length,
                total: packet.total(),
                next_index: packet.index() + 1,
            };
            return Ok(None);
        }

        let accumulated = self.data.len();
        if accumulated != length as usize || accumulated + SUB_HEADER_SIZE != self.carried {
            return Err(FramingError::LengthMismatch {
                declared: length,
                accumulated,
                carried: self.carried,
            });
        }

        Ok(Some(Message::new(command, std::mem::take(&mut self.data))))
    }
}

/// Reassemble a complete in-memory packet stream
pub fn decode_stream<'a>(
    packets: impl IntoIterator<Item = &'a Packet>,
) -> Result<Message, FramingError> {
    let mut reassembler = Reassembler::new();
    let mut received = 0;
    let mut expected = 0;
    for packet in packets {
        received += 1;
        expected = packet.total();
        if let Some(message) = reassembler.push(packet)? {
            return Ok(message);
        }
    }
    Err(FramingError::Incomplete { received, expected })
}

/// What a completed stream means to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Message(Message),
    /// Device asks for the last packet stream to be resent
    RetryRequested,
}

/// How a read timeout is reported by [`consume`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Timeout is an error (`ProtocolError::Transport(Timeout)`)
    #[default]
    Fatal,
    /// Timeout yields `Ok(None)` so the caller can poll again
    Soft,
}

/// Post-completion handling of reserved commands.
///
/// Debug text is decoded into `sink` and swallowed (`None`).
pub(crate) fn dispatch(
    message: Message,
    reserved: &ReservedCommands,
    sink: &dyn DebugSink,
) -> Option<ReceiveOutcome> {
    if message.command() == reserved.debug_message {
        sink.line(&debug_text::decode(message.payload()));
        None
    } else if message.command() == reserved.retry {
        Some(ReceiveOutcome::RetryRequested)
    } else {
        Some(ReceiveOutcome::Message(message))
    }
}

/// Parameters of one receive
pub struct ReceiveContext<'a> {
    pub read_timeout: Duration,
    pub reserved: &'a ReservedCommands,
    pub sink: &'a dyn DebugSink,
    pub cancel: &'a CancelToken,
}

/// Read packets until a caller-visible outcome is complete.
///
/// Debug streams are logged and reading continues with the next stream.
/// Returns `Ok(None)` only under [`TimeoutPolicy::Soft`] when a read times
/// out; a partially received stream is discarded in that case.
pub fn consume(
    transport: &dyn Transport,
    ctx: &ReceiveContext<'_>,
    policy: TimeoutPolicy,
) -> Result<Option<ReceiveOutcome>, ProtocolError> {
    let mut reassembler = Reassembler::new();

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(ProtocolError::Cancelled);
        }

        let raw = match transport.read_packet(ctx.read_timeout) {
            Ok(raw) => raw,
            Err(e) if e.is_timeout() && policy == TimeoutPolicy::Soft => {
                if !reassembler.is_idle() {
                    debug!("Read timeout mid-stream, discarding partial message");
                }
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let packet = Packet::from_bytes(&raw).inspect_err(|e| warn!("Bad packet: {}", e))?;
        debug!("RX {:?}", packet);

        let message = match reassembler.push(&packet) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                warn!("Message receive failed: {}", e);
                return Err(e.into());
            }
        };

        debug!(
            "Received {} (0x{:04X}), {} bytes",
            cmd::name(message.command()),
            message.command(),
            message.len()
        );

        if let Some(outcome) = dispatch(message, ctx.reserved, ctx.sink) {
            return Ok(Some(outcome));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::types::FlipBit;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl DebugSink for Lines {
        fn line(&self, text: &str) {
            self.0.lock().push(text.to_string());
        }
    }

    fn packet(bytes: &[u8]) -> Packet {
        Packet::from_bytes(bytes).unwrap()
    }

    /// Full-size packet with the given header and payload prefix
    fn padded(control: u8, index: u8, prefix: &[u8]) -> Packet {
        let mut raw = [0u8; crate::protocol::PACKET_SIZE];
        raw[0] = control;
        raw[1] = index;
        raw[2..2 + prefix.len()].copy_from_slice(prefix);
        packet(&raw)
    }

    #[test]
    fn test_multi_packet_reassembly() {
        let msg = Message::new(0x0101, (0..200u8).collect::<Vec<_>>());
        let stream = encode(&msg, FlipBit::Set, true).unwrap();
        let mut r = Reassembler::new();
        let (last, head) = stream.packets().split_last().unwrap();
        for p in head {
            assert_eq!(r.push(p).unwrap(), None);
            assert!(!r.is_idle());
        }
        assert_eq!(r.push(last).unwrap(), Some(msg));
        assert!(r.is_idle());
    }

    #[test]
    fn test_declared_length_off_by_one() {
        // cmd 0x0005, declared len 3, but only 2 data bytes carried
        let p = packet(&[0x06, 0x00, 0x05, 0x00, 0x03, 0x00, 0xAA, 0xBB]);
        let mut r = Reassembler::new();
        assert_eq!(
            r.push(&p),
            Err(FramingError::LengthMismatch {
                declared: 3,
                accumulated: 2,
                carried: 6
            })
        );
        assert!(r.is_idle());
    }

    #[test]
    fn test_inconsistent_total_fails_stream() {
        let first = padded(0x3E, 0x01, &[0x05, 0x00, 0x50, 0x00]);
        // Claims index 1 of a 3-packet stream
        let second = packet(&[0x02, 0x12, 0xAA, 0xBB]);
        let mut r = Reassembler::new();
        assert_eq!(r.push(&first), Ok(None));
        assert_eq!(
            r.push(&second),
            Err(FramingError::InconsistentStreamLength {
                expected: 2,
                got: 3
            })
        );
        assert!(r.is_idle());
    }

    #[test]
    fn test_stream_must_start_at_index_zero() {
        let stray = packet(&[0x02, 0x11, 0xAA, 0xBB]);
        assert_eq!(
            Reassembler::new().push(&stray),
            Err(FramingError::UnexpectedIndex {
                expected: 0,
                got: 1
            })
        );
    }

    #[test]
    fn test_first_packet_without_sub_header() {
        let p = packet(&[0x02, 0x00, 0x01, 0x00]);
        assert!(matches!(
            Reassembler::new().push(&p),
            Err(FramingError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_stream_incomplete() {
        let msg = Message::new(0x0101, vec![7; 100]);
        let stream = encode(&msg, FlipBit::Clear, false).unwrap();
        assert_eq!(
            decode_stream(&stream.packets()[..1]),
            Err(FramingError::Incomplete {
                received: 1,
                expected: 2
            })
        );
        assert_eq!(decode_stream(&stream), Ok(msg));
    }

    #[test]
    fn test_dispatch_reserved_commands() {
        let reserved = ReservedCommands::default();
        let lines = Lines::default();

        let dbg = Message::new(cmd::DEBUG_MESSAGE, vec![b'h', 0, b'i', 0, 0, 0]);
        assert_eq!(dispatch(dbg, &reserved, &lines), None);
        assert_eq!(lines.0.lock().as_slice(), ["hi"]);

        assert_eq!(
            dispatch(Message::empty(cmd::RETRY), &reserved, &lines),
            Some(ReceiveOutcome::RetryRequested)
        );

        let ping = Message::new(cmd::PING, vec![1, 2]);
        assert_eq!(
            dispatch(ping.clone(), &reserved, &lines),
            Some(ReceiveOutcome::Message(ping))
        );
    }
}
