//! Protocol constants for the 64-byte HID message framing

use serde::{Deserialize, Serialize};

/// Size of one transport packet (HID interrupt endpoint MTU)
pub const PACKET_SIZE: usize = 64;

/// Control byte + index byte
pub const PACKET_HEADER_SIZE: usize = 2;

/// Payload bytes available in one packet
pub const PACKET_PAYLOAD_SIZE: usize = PACKET_SIZE - PACKET_HEADER_SIZE;

/// `command` (LE16) + `length` (LE16), carried at the start of the first packet
pub const SUB_HEADER_SIZE: usize = 4;

/// The index byte has a 4-bit packet index
pub const MAX_PACKETS: usize = 16;

/// Largest payload a single message can carry
pub const MAX_MESSAGE_PAYLOAD: usize = MAX_PACKETS * PACKET_PAYLOAD_SIZE - SUB_HEADER_SIZE;

/// Out-of-band marker that resets the device's framing state
pub const FLIP_BIT_RESET_MARKER: [u8; 2] = [0xFF, 0xFF];

/// Control byte layout
pub mod control {
    /// Synchronisation bit, alternates per outgoing message
    pub const FLIP_BIT: u8 = 0x80;
    /// Requests a low-level acknowledgment packet
    pub const ACK_REQUEST: u8 = 0x40;
    /// Payload length in this packet
    pub const LENGTH_MASK: u8 = 0x3F;
}

/// Message command codes (16-bit, little-endian on the wire)
pub mod cmd {
    pub const PING: u16 = 0x0001;
    /// Device asks the host to resend its last packet stream
    pub const RETRY: u16 = 0x0002;
    pub const PLATFORM_INFO: u16 = 0x0003;
    pub const GET_DEVICE_STATUS: u16 = 0x0011;
    /// Debug text, UTF-16LE code units
    pub const DEBUG_MESSAGE: u16 = 0x8000;

    /// Get human-readable name for a command code
    pub fn name(cmd: u16) -> &'static str {
        match cmd {
            PING => "PING",
            RETRY => "RETRY",
            PLATFORM_INFO => "PLATFORM_INFO",
            GET_DEVICE_STATUS => "GET_DEVICE_STATUS",
            DEBUG_MESSAGE => "DEBUG_MESSAGE",
            _ => "UNKNOWN",
        }
    }
}

/// Timing constants
pub mod timing {
    /// Delay after each packet write so the device can drain its endpoint
    pub const PACKET_SETTLE_US: u64 = 700;
    /// Wait before retransmitting to a busy device
    pub const BUSY_BACKOFF_MS: u64 = 1000;
    /// Attempts at sending the flip-bit reset marker
    pub const FLIP_RESET_ATTEMPTS: u32 = 10;
    /// Wait between failed flip-bit reset attempts
    pub const FLIP_RESET_BACKOFF_MS: u64 = 1000;
    /// Read timeout while waiting for handshake echoes
    pub const HANDSHAKE_READ_TIMEOUT_MS: u64 = 500;
    /// Settle time after opening the device, before the handshake
    pub const POST_OPEN_DELAY_MS: u64 = 500;
    /// Default read timeout for replies
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;
}

/// Command codes the protocol layer interprets itself.
///
/// Overridable for firmware variants that renumber their command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservedCommands {
    /// Debug text, consumed as a log side channel
    pub debug_message: u16,
    /// Retry-requested reply
    pub retry: u16,
    /// Device status; an unsolicited status reply means the device is busy
    pub device_status: u16,
}

impl Default for ReservedCommands {
    fn default() -> Self {
        Self {
            debug_message: cmd::DEBUG_MESSAGE,
            retry: cmd::RETRY,
            device_status: cmd::GET_DEVICE_STATUS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limits() {
        assert_eq!(PACKET_PAYLOAD_SIZE, 62);
        assert_eq!(MAX_MESSAGE_PAYLOAD, 988);
    }

    #[test]
    fn test_reserved_commands_partial_override() {
        let json = r#"{ "retry": 7 }"#;
        let reserved: ReservedCommands = serde_json::from_str(json).unwrap();
        assert_eq!(reserved.retry, 7);
        assert_eq!(reserved.debug_message, cmd::DEBUG_MESSAGE);
        assert_eq!(reserved.device_status, cmd::GET_DEVICE_STATUS);
    }

    #[test]
    fn test_cmd_names() {
        assert_eq!(cmd::name(cmd::PING), "PING");
        assert_eq!(cmd::name(0x1234), "UNKNOWN");
    }
}
