//! Transport and protocol error types

use thiserror::Error;

/// Errors raised by a raw packet transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Communication timeout")]
    Timeout,

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// True for the expected "nothing arrived in time" outcome of a read
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}

/// Reassembly failures. The partial message is discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error(
        "payload size mismatch: header declares {declared} bytes, accumulated {accumulated}, packets carried {carried} (incl. 4-byte sub-header)"
    )]
    LengthMismatch {
        declared: u16,
        accumulated: usize,
        carried: usize,
    },

    #[error("packet claims a {got}-packet stream, stream started as {expected} packets")]
    InconsistentStreamLength { expected: u8, got: u8 },

    #[error("expected packet index {expected}, got {got}")]
    UnexpectedIndex { expected: u8, got: u8 },

    #[error("truncated packet: {len} bytes, needs {needed}")]
    Truncated { len: usize, needed: usize },

    #[error("stream ended after {received} of {expected} packets")]
    Incomplete { received: usize, expected: u8 },
}

/// Session handshake failures. The caller has to run `connect` again.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("flip-bit reset marker could not be sent after {attempts} attempts")]
    LinkDown { attempts: u32 },

    #[error("handshake aborted: {0}")]
    Aborted(#[source] TransportError),

    #[error("probe message needs {packets} packets, handshake probes must fit one")]
    ProbeTooLarge { packets: usize },

    #[error("handshake cancelled")]
    Cancelled,
}

/// Errors surfaced by the request/reply layer
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("message of {payload_len} payload bytes needs {packets} packets (max 16)")]
    OversizeMessage { payload_len: usize, packets: usize },

    #[error("Not connected to device")]
    NotConnected,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("device still busy after {attempts} retransmissions")]
    RetryLimitExceeded { attempts: u32 },
}
