//! Common types for the framing layer

use crate::protocol::{control, MAX_MESSAGE_PAYLOAD};

/// Logical unit exchanged with the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    command: u16,
    payload: Vec<u8>,
}

impl Message {
    /// Build a message. The declared length is always the payload length.
    pub fn new(command: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Message with no payload
    pub fn empty(command: u16) -> Self {
        Self::new(command, Vec::new())
    }

    pub fn command(&self) -> u16 {
        self.command
    }

    /// Declared payload byte count (`length` field on the wire)
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Whether the message fits in one packet stream
    pub fn fits(&self) -> bool {
        self.payload.len() <= MAX_MESSAGE_PAYLOAD
    }
}

/// Synchronisation bit carried by every packet of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlipBit {
    #[default]
    Clear,
    Set,
}

impl FlipBit {
    /// Control-byte representation (0x00 or 0x80)
    pub fn bits(self) -> u8 {
        match self {
            FlipBit::Clear => 0x00,
            FlipBit::Set => control::FLIP_BIT,
        }
    }

    /// Extract from a control byte
    pub fn from_control(byte: u8) -> Self {
        if byte & control::FLIP_BIT != 0 {
            FlipBit::Set
        } else {
            FlipBit::Clear
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            FlipBit::Clear => FlipBit::Set,
            FlipBit::Set => FlipBit::Clear,
        }
    }
}

/// Device identification information
#[derive(Debug, Clone, Default)]
pub struct TransportDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Interface number, -1 if unknown
    pub interface_number: i32,
    /// Serial number if available
    pub serial: Option<String>,
    /// Product name if available
    pub product_name: Option<String>,
}

/// Discovered device that can be opened
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    pub info: TransportDeviceInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_bit_bits() {
        assert_eq!(FlipBit::Clear.bits(), 0x00);
        assert_eq!(FlipBit::Set.bits(), 0x80);
        assert_eq!(FlipBit::from_control(0xC5), FlipBit::Set);
        assert_eq!(FlipBit::from_control(0x45), FlipBit::Clear);
        assert_eq!(FlipBit::Set.toggled(), FlipBit::Clear);
    }

    #[test]
    fn test_message_length_follows_payload() {
        let msg = Message::new(0x0001, vec![1, 2, 3]);
        assert_eq!(msg.len(), 3);
        assert!(msg.fits());
        assert!(!Message::new(0x0001, vec![0; MAX_MESSAGE_PAYLOAD + 1]).fits());
    }
}
