//! Session value and its configuration
//!
//! A [`Session`] only exists once the handshake has succeeded; it owns the
//! transport handle, the flip-bit sequence and the read timeout. Exchanges
//! are serialized by an internal lock, so a `Session` can be shared between
//! threads, but only one message is ever in flight.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::info;

use crate::cancel::CancelToken;
use crate::debug_text::{DebugSink, TracingSink};
use crate::error::{HandshakeError, ProtocolError};
use crate::handshake::{self, HandshakeTiming};
use crate::protocol::{timing, ReservedCommands};
use crate::reassembly::{consume, ReceiveContext, ReceiveOutcome, TimeoutPolicy};
use crate::sequence::SequenceController;
use crate::types::{FlipBit, Message};
use crate::Transport;

/// Bound on busy retransmissions of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryLimit {
    /// Retry until the device answers; the firmware is expected to cooperate
    #[default]
    Unbounded,
    /// Give up after this many retransmissions
    Attempts(u32),
}

impl RetryLimit {
    /// Whether `retries` retransmissions exceed the limit
    pub fn exceeded(self, retries: u32) -> bool {
        match self {
            RetryLimit::Unbounded => false,
            RetryLimit::Attempts(max) => retries > max,
        }
    }
}

impl From<Option<u32>> for RetryLimit {
    fn from(limit: Option<u32>) -> Self {
        limit.map_or(RetryLimit::Unbounded, RetryLimit::Attempts)
    }
}

/// Session parameters
#[derive(Clone)]
pub struct SessionConfig {
    /// Timeout of each reply read
    pub read_timeout: Duration,
    /// Set the ack-request flag on outgoing packets and expect one
    /// acknowledgment packet before each reply
    pub ack_enabled: bool,
    pub busy_retry: RetryLimit,
    /// Delay after every packet write
    pub packet_settle: Duration,
    /// Wait before retransmitting to a busy device
    pub busy_backoff: Duration,
    pub reserved: ReservedCommands,
    pub handshake: HandshakeTiming,
    pub debug_sink: Arc<dyn DebugSink>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(timing::DEFAULT_READ_TIMEOUT_MS),
            ack_enabled: false,
            busy_retry: RetryLimit::Unbounded,
            packet_settle: Duration::from_micros(timing::PACKET_SETTLE_US),
            busy_backoff: Duration::from_millis(timing::BUSY_BACKOFF_MS),
            reserved: ReservedCommands::default(),
            handshake: HandshakeTiming::default(),
            debug_sink: Arc::new(TracingSink),
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("read_timeout", &self.read_timeout)
            .field("ack_enabled", &self.ack_enabled)
            .field("busy_retry", &self.busy_retry)
            .field("packet_settle", &self.packet_settle)
            .field("busy_backoff", &self.busy_backoff)
            .field("reserved", &self.reserved)
            .field("handshake", &self.handshake)
            .finish_non_exhaustive()
    }
}

impl SessionConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_ack(mut self, enabled: bool) -> Self {
        self.ack_enabled = enabled;
        self
    }

    pub fn with_busy_retry(mut self, limit: RetryLimit) -> Self {
        self.busy_retry = limit;
        self
    }

    pub fn with_packet_settle(mut self, delay: Duration) -> Self {
        self.packet_settle = delay;
        self
    }

    pub fn with_busy_backoff(mut self, delay: Duration) -> Self {
        self.busy_backoff = delay;
        self
    }

    pub fn with_reserved(mut self, reserved: ReservedCommands) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn with_handshake(mut self, timing: HandshakeTiming) -> Self {
        self.handshake = timing;
        self
    }

    pub fn with_debug_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = sink;
        self
    }
}

/// Mutable per-session state, guarded for the duration of an exchange
pub(crate) struct SessionState {
    pub(crate) sequence: SequenceController,
    pub(crate) connected: bool,
    pub(crate) read_timeout: Duration,
}

/// An established link to the device
pub struct Session {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: SessionConfig,
    pub(crate) cancel: CancelToken,
    pub(crate) state: Mutex<SessionState>,
}

impl Session {
    /// Run the handshake on `transport` and return the established session.
    ///
    /// `probe` must fit in a single packet; the device's auxiliary and main
    /// controllers both echo it.
    pub fn connect(
        transport: Arc<dyn Transport>,
        probe: &Message,
        config: SessionConfig,
        cancel: CancelToken,
    ) -> Result<Self, HandshakeError> {
        let mut sequence = SequenceController::new();
        handshake::run(
            transport.as_ref(),
            probe,
            &mut sequence,
            &config.handshake,
            &cancel,
        )?;
        info!("Connected, next flip bit 0x{:02X}", sequence.current().bits());
        Ok(Self::build(transport, config, cancel, sequence))
    }

    /// Adopt a link whose framing state is already known, skipping the
    /// handshake. The next outgoing message uses `next_flip`.
    pub fn resume(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        cancel: CancelToken,
        next_flip: FlipBit,
    ) -> Self {
        let mut sequence = SequenceController::new();
        sequence.reset_to(next_flip);
        Self::build(transport, config, cancel, sequence)
    }

    fn build(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        cancel: CancelToken,
        sequence: SequenceController,
    ) -> Self {
        let read_timeout = config.read_timeout;
        Self {
            transport,
            config,
            cancel,
            state: Mutex::new(SessionState {
                sequence,
                connected: true,
                read_timeout,
            }),
        }
    }

    /// Release the transport and reset it.
    ///
    /// Fails with `NotConnected` when called twice.
    pub fn disconnect(&self) -> Result<(), ProtocolError> {
        let mut state = self.lock_connected()?;
        state.connected = false;
        info!("Disconnecting from device");
        let reset = self.transport.reset();
        self.transport.dispose()?;
        reset?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Flip bit the next new message will carry
    pub fn next_flip_bit(&self) -> FlipBit {
        self.state.lock().sequence.current()
    }

    pub fn read_timeout(&self) -> Duration {
        self.state.lock().read_timeout
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Wait for one unsolicited message.
    ///
    /// With [`TimeoutPolicy::Soft`] a read timeout returns `Ok(None)`.
    pub fn receive(&self, policy: TimeoutPolicy) -> Result<Option<ReceiveOutcome>, ProtocolError> {
        let state = self.lock_connected()?;
        consume(
            self.transport.as_ref(),
            &self.receive_context(state.read_timeout),
            policy,
        )
    }

    pub(crate) fn receive_context(&self, read_timeout: Duration) -> ReceiveContext<'_> {
        ReceiveContext {
            read_timeout,
            reserved: &self.config.reserved,
            sink: self.config.debug_sink.as_ref(),
            cancel: &self.cancel,
        }
    }

    pub(crate) fn lock_connected(&self) -> Result<MutexGuard<'_, SessionState>, ProtocolError> {
        let state = self.state.lock();
        if state.connected {
            Ok(state)
        } else {
            Err(ProtocolError::NotConnected)
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.transport.device_info().device_path)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_limit() {
        assert!(!RetryLimit::Unbounded.exceeded(u32::MAX));
        assert!(!RetryLimit::Attempts(3).exceeded(3));
        assert!(RetryLimit::Attempts(3).exceeded(4));
        assert_eq!(RetryLimit::from(None), RetryLimit::Unbounded);
        assert_eq!(RetryLimit::from(Some(2)), RetryLimit::Attempts(2));
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::default()
            .with_ack(true)
            .with_read_timeout(Duration::from_millis(250))
            .with_busy_retry(RetryLimit::Attempts(5));
        assert!(config.ack_enabled);
        assert_eq!(config.read_timeout, Duration::from_millis(250));
        assert_eq!(config.busy_retry, RetryLimit::Attempts(5));
        assert_eq!(config.packet_settle, Duration::from_micros(700));
    }
}
