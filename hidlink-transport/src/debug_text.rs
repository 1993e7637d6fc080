//! Device debug text side channel
//!
//! Debug messages carry 16-bit little-endian code units terminated by a zero
//! unit. They never reach the caller as messages; decoded lines go to a
//! [`DebugSink`].

use tracing::info;

/// Receives decoded device debug lines
pub trait DebugSink: Send + Sync {
    fn line(&self, text: &str);
}

/// Default sink: logs on the `hidlink::device` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn line(&self, text: &str) {
        info!(target: "hidlink::device", "DBG: {}", text);
    }
}

/// Decode a debug payload into text.
///
/// Stops at the first zero code unit; an odd trailing byte is ignored.
pub fn decode(payload: &[u8]) -> String {
    let units = payload
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0);
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16_payload(text: &str) -> Vec<u8> {
        let mut out: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        out.extend_from_slice(&[0, 0]);
        out
    }

    #[test]
    fn test_decode_terminated() {
        assert_eq!(decode(&utf16_payload("boot ok")), "boot ok");
    }

    #[test]
    fn test_decode_without_terminator_and_odd_byte() {
        let mut payload: Vec<u8> = "ab".encode_utf16().flat_map(u16::to_le_bytes).collect();
        payload.push(0x7F);
        assert_eq!(decode(&payload), "ab");
    }

    #[test]
    fn test_decode_lone_surrogate() {
        assert_eq!(decode(&[0x00, 0xD8, 0x41, 0x00]), "\u{FFFD}A");
    }
}
