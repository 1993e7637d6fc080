//! Request/reply coordination
//!
//! ```text
//! encode (current flip bit) -> advance flip bit
//!   -> send packets (settle delay after each)
//!   -> [ack enabled] read + discard one ack packet
//!   -> receive reply
//!   -> busy? back off, resend the same packets
//! ```

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::codec::{encode, PacketStream};
use crate::error::{ProtocolError, TransportError};
use crate::protocol::{cmd, ReservedCommands};
use crate::reassembly::{consume, ReceiveOutcome, TimeoutPolicy};
use crate::session::Session;
use crate::types::Message;

/// Polling slice for cancellable waits
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Sleep for `total`, returning early with `Cancelled` if the token fires
fn pause(total: Duration, cancel: &CancelToken) -> Result<(), ProtocolError> {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return Err(ProtocolError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        std::thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}

/// Whether `reply` means the device was busy and the request must be resent.
///
/// A retry request counts only when the caller asked for it; a device-status
/// reply counts unless status is what was requested.
pub fn is_transient_busy(
    reply: &ReceiveOutcome,
    sent_command: u16,
    retry_on_retry_signal: bool,
    reserved: &ReservedCommands,
) -> bool {
    match reply {
        ReceiveOutcome::RetryRequested => retry_on_retry_signal,
        ReceiveOutcome::Message(msg) => {
            msg.command() == reserved.device_status && sent_command != reserved.device_status
        }
    }
}

impl Session {
    fn transmit(&self, stream: &PacketStream) -> Result<(), ProtocolError> {
        debug!(
            "Sending {} packet(s), flip bit 0x{:02X}",
            stream.len(),
            stream.flip_bit().bits()
        );
        for packet in stream {
            if self.cancel.is_cancelled() {
                return Err(ProtocolError::Cancelled);
            }
            self.transport.send_packet(packet.as_bytes())?;
            debug!("TX {:?}", packet);
            if !self.config.packet_settle.is_zero() {
                std::thread::sleep(self.config.packet_settle);
            }
        }
        Ok(())
    }

    /// Send a message without waiting for a reply
    pub fn send_only(&self, message: &Message) -> Result<(), ProtocolError> {
        let mut state = self.lock_connected()?;
        let stream = encode(message, state.sequence.current(), self.config.ack_enabled)?;
        state.sequence.advance();
        self.transmit(&stream)
    }

    /// Send a message and return the device's reply.
    ///
    /// Busy replies are answered by resending the identical packet stream
    /// (same flip bit) after `busy_backoff`, up to `busy_retry`. When
    /// `retry_on_retry_signal` is false a retry request is returned as a
    /// message carrying the retry command.
    pub fn request(
        &self,
        message: &Message,
        retry_on_retry_signal: bool,
    ) -> Result<Message, ProtocolError> {
        let mut state = self.lock_connected()?;
        let stream = encode(message, state.sequence.current(), self.config.ack_enabled)?;
        state.sequence.advance();
        let read_timeout = state.read_timeout;
        let reserved = &self.config.reserved;

        let mut retries = 0u32;
        loop {
            self.transmit(&stream)?;

            if self.config.ack_enabled {
                let ack = self.transport.read_packet(read_timeout)?;
                debug!("Transport ack {:02X?}", &ack[..ack.len().min(2)]);
            }

            let reply = consume(
                self.transport.as_ref(),
                &self.receive_context(read_timeout),
                TimeoutPolicy::Fatal,
            )?
            .ok_or(ProtocolError::Transport(TransportError::Timeout))?;

            if !is_transient_busy(&reply, message.command(), retry_on_retry_signal, reserved) {
                return Ok(match reply {
                    ReceiveOutcome::Message(msg) => msg,
                    ReceiveOutcome::RetryRequested => Message::empty(reserved.retry),
                });
            }

            retries += 1;
            if self.config.busy_retry.exceeded(retries) {
                warn!(
                    "{} (0x{:04X}) still busy, giving up",
                    cmd::name(message.command()),
                    message.command()
                );
                return Err(ProtocolError::RetryLimitExceeded {
                    attempts: retries - 1,
                });
            }
            warn!(
                "Device busy, retrying {} (attempt {})",
                cmd::name(message.command()),
                retries
            );
            pause(self.config.busy_backoff, &self.cancel)?;
        }
    }

    /// Single-packet round trip used by throughput measurement: send the
    /// pre-encoded `stream`, read the optional ack and one reply packet.
    ///
    /// Returns the number of packets read.
    pub fn ping_pong(&self, stream: &PacketStream) -> Result<usize, ProtocolError> {
        let state = self.lock_connected()?;
        self.transmit(stream)?;
        let mut read = 0;
        if self.config.ack_enabled {
            self.transport.read_packet(state.read_timeout)?;
            read += 1;
        }
        self.transport.read_packet(state.read_timeout)?;
        Ok(read + 1)
    }

    /// Encode `message` with the next flip bit, advancing it, without sending
    pub fn prepare(&self, message: &Message) -> Result<PacketStream, ProtocolError> {
        let mut state = self.lock_connected()?;
        let stream = encode(message, state.sequence.current(), self.config.ack_enabled)?;
        state.sequence.advance();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_rules() {
        let reserved = ReservedCommands::default();
        let status = ReceiveOutcome::Message(Message::empty(cmd::GET_DEVICE_STATUS));
        let ping = ReceiveOutcome::Message(Message::empty(cmd::PING));

        assert!(is_transient_busy(&ReceiveOutcome::RetryRequested, cmd::PING, true, &reserved));
        assert!(!is_transient_busy(&ReceiveOutcome::RetryRequested, cmd::PING, false, &reserved));
        assert!(is_transient_busy(&status, cmd::PING, false, &reserved));
        assert!(!is_transient_busy(&status, cmd::GET_DEVICE_STATUS, true, &reserved));
        assert!(!is_transient_busy(&ping, cmd::PING, true, &reserved));
    }

    #[test]
    fn test_pause_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            pause(Duration::from_secs(10), &cancel),
            Err(ProtocolError::Cancelled)
        ));
        assert!(pause(Duration::ZERO, &CancelToken::new()).is_ok());
    }
}
