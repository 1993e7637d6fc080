//! Two-stage session handshake
//!
//! ```text
//! Disconnected -> FlipBitReset -> ProbeSent -> AuxAckAwaited -> MainAckAwaited -> Connected
//! ```
//!
//! The host sends the `FF FF` marker so the device drops its framing state,
//! then a single-packet probe with the ack flag forced on. The auxiliary
//! controller echoes the probe verbatim, the main controller echoes it again
//! without the ack flag.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::codec::{encode, Packet};
use crate::error::{HandshakeError, ProtocolError, TransportError};
use crate::protocol::{timing, FLIP_BIT_RESET_MARKER};
use crate::sequence::SequenceController;
use crate::types::{FlipBit, Message};
use crate::Transport;

/// Handshake progress, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Disconnected,
    FlipBitReset,
    ProbeSent,
    AuxAckAwaited,
    MainAckAwaited,
    Connected,
}

/// Handshake retry and timeout parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTiming {
    /// Attempts at sending the flip-bit reset marker
    pub reset_attempts: u32,
    pub reset_backoff: Duration,
    /// Timeout of each echo read
    pub echo_timeout: Duration,
    /// Wait after the main controller echo before the first message
    pub post_connect_settle: Duration,
}

impl Default for HandshakeTiming {
    fn default() -> Self {
        Self {
            reset_attempts: timing::FLIP_RESET_ATTEMPTS,
            reset_backoff: Duration::from_millis(timing::FLIP_RESET_BACKOFF_MS),
            echo_timeout: Duration::from_millis(timing::HANDSHAKE_READ_TIMEOUT_MS),
            post_connect_settle: Duration::from_millis(timing::POST_OPEN_DELAY_MS),
        }
    }
}

fn enter(state: HandshakeState) {
    debug!("Handshake -> {:?}", state);
}

/// Encode the probe as a single packet using the current flip bit
fn probe_packet(
    probe: &Message,
    sequence: &mut SequenceController,
) -> Result<Packet, HandshakeError> {
    let stream = encode(probe, sequence.current(), false).map_err(|e| match e {
        ProtocolError::OversizeMessage { packets, .. } => HandshakeError::ProbeTooLarge { packets },
        other => HandshakeError::Aborted(TransportError::Internal(other.to_string())),
    })?;
    if stream.len() != 1 {
        return Err(HandshakeError::ProbeTooLarge {
            packets: stream.len(),
        });
    }
    sequence.advance();

    let mut packet = stream.into_packets().remove(0);
    packet.set_ack_request(true);
    Ok(packet)
}

fn send_reset_marker(
    transport: &dyn Transport,
    timing: &HandshakeTiming,
    cancel: &CancelToken,
) -> Result<(), HandshakeError> {
    for attempt in 1..=timing.reset_attempts {
        if cancel.is_cancelled() {
            return Err(HandshakeError::Cancelled);
        }
        match transport.send_packet(&FLIP_BIT_RESET_MARKER) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!("Flip-bit reset attempt {} failed: {}", attempt, e);
                if attempt < timing.reset_attempts {
                    std::thread::sleep(timing.reset_backoff);
                }
            }
        }
    }
    Err(HandshakeError::LinkDown {
        attempts: timing.reset_attempts,
    })
}

/// Whether a received packet reproduces the reference packet's header and
/// payload. Trailing padding is ignored.
pub fn is_echo_of(received: &[u8], reference: &Packet) -> bool {
    received.starts_with(reference.framed_bytes())
}

/// Read until a packet echoing `reference` arrives. Mismatching packets are
/// drained; transport errors abort.
fn await_echo(
    transport: &dyn Transport,
    reference: &Packet,
    who: &str,
    timing: &HandshakeTiming,
    cancel: &CancelToken,
) -> Result<(), HandshakeError> {
    loop {
        if cancel.is_cancelled() {
            return Err(HandshakeError::Cancelled);
        }
        let data = transport
            .read_packet(timing.echo_timeout)
            .map_err(HandshakeError::Aborted)?;
        if is_echo_of(&data, reference) {
            info!("Received {} controller ack", who);
            return Ok(());
        }
        debug!(
            "Incorrect {} controller echo {:02X?}, draining",
            who,
            &data[..data.len().min(reference.framed_bytes().len())]
        );
    }
}

fn await_both_echoes(
    transport: &dyn Transport,
    reference: &mut Packet,
    timing: &HandshakeTiming,
    cancel: &CancelToken,
) -> Result<(), HandshakeError> {
    enter(HandshakeState::AuxAckAwaited);
    await_echo(transport, reference, "aux", timing, cancel)?;

    // Main controller echoes without the ack request
    reference.set_ack_request(false);
    enter(HandshakeState::MainAckAwaited);
    await_echo(transport, reference, "main", timing, cancel)
}

/// Run the handshake. On success `sequence` holds the flip bit for the first
/// message after the probe.
pub(crate) fn run(
    transport: &dyn Transport,
    probe: &Message,
    sequence: &mut SequenceController,
    timing: &HandshakeTiming,
    cancel: &CancelToken,
) -> Result<(), HandshakeError> {
    enter(HandshakeState::Disconnected);
    sequence.reset_to(FlipBit::Clear);
    let mut reference = probe_packet(probe, sequence)?;

    enter(HandshakeState::FlipBitReset);
    send_reset_marker(transport, timing, cancel)?;

    transport
        .send_packet(reference.as_bytes())
        .map_err(HandshakeError::Aborted)?;
    enter(HandshakeState::ProbeSent);

    // The probe is out: any failure from here on leaves the device mid-handshake
    if let Err(e) = await_both_echoes(transport, &mut reference, timing, cancel) {
        warn!("Handshake failed: {}", e);
        if let Err(reset_err) = transport.reset() {
            debug!("Transport reset after failed handshake failed: {}", reset_err);
        }
        return Err(e);
    }

    if !timing.post_connect_settle.is_zero() {
        std::thread::sleep(timing.post_connect_settle);
    }
    enter(HandshakeState::Connected);
    Ok(())
}
