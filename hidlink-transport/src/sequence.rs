//! Flip-bit sequence controller

use crate::types::FlipBit;

/// Tracks the flip bit for the next outgoing message.
///
/// Advanced exactly once per new message; retransmissions reuse the stream
/// encoded before the advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceController {
    bit: FlipBit,
}

impl SequenceController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> FlipBit {
        self.bit
    }

    pub fn advance(&mut self) {
        self.bit = self.bit.toggled();
    }

    pub fn reset_to(&mut self, bit: FlipBit) {
        self.bit = bit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternates() {
        let mut seq = SequenceController::new();
        let seen: Vec<u8> = (0..4)
            .map(|_| {
                let b = seq.current().bits();
                seq.advance();
                b
            })
            .collect();
        assert_eq!(seen, vec![0x00, 0x80, 0x00, 0x80]);

        seq.reset_to(FlipBit::Clear);
        assert_eq!(seq.current(), FlipBit::Clear);
    }
}
