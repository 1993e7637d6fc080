//! Message framing over 64-byte USB HID packets
//!
//! Messages of up to 988 payload bytes are cut into at most 16 packets, each
//! tagged with an alternating flip bit. A session is opened with a two-stage
//! echo handshake (auxiliary controller, then main controller) and then
//! carries one request/reply exchange at a time.
//!
//! ```text
//! [HidTransport / MockTransport]   <- implements Transport (raw packets)
//!              |
//!     [PrinterTransport]           <- optional traffic monitor
//!              |
//!          [Session]               <- handshake, flip bit, request/reply
//! ```

pub mod cancel;
pub mod codec;
pub mod debug_text;
pub mod error;
pub mod handshake;
pub mod mock;
pub mod printer;
pub mod protocol;
pub mod reassembly;
pub mod sequence;
pub mod types;

mod coordinator;
mod hid;
mod session;

pub use cancel::CancelToken;
pub use codec::{encode, packets_needed, Packet, PacketStream};
pub use coordinator::is_transient_busy;
pub use debug_text::{DebugSink, TracingSink};
pub use error::{FramingError, HandshakeError, ProtocolError, TransportError};
pub use handshake::{HandshakeState, HandshakeTiming};
pub use hid::{list_devices, HidTransport};
pub use printer::{DecodedPacket, OutputFormat, PacketFilter, PrinterConfig, PrinterTransport};
pub use protocol::{cmd, ReservedCommands};
pub use reassembly::{consume, decode_stream, ReceiveOutcome, Reassembler, TimeoutPolicy};
pub use sequence::SequenceController;
pub use session::{RetryLimit, Session, SessionConfig};
pub use types::{DiscoveredDevice, FlipBit, Message, TransportDeviceInfo};

use std::sync::Arc;
use std::time::Duration;

/// Raw packet I/O - all backends implement this
///
/// Transports know nothing about framing; they move whole packets.
pub trait Transport: Send + Sync {
    /// Write one packet
    fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError>;

    /// Read one packet, blocking up to `timeout`.
    ///
    /// Returns `TransportError::Timeout` when nothing arrived in time.
    fn read_packet(&self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Bring the link back to a clean state
    fn reset(&self) -> Result<(), TransportError>;

    /// Release the underlying device
    fn dispose(&self) -> Result<(), TransportError>;

    /// Get device information
    fn device_info(&self) -> &TransportDeviceInfo;
}

/// Type alias for a shared transport
pub type BoxedTransport = Arc<dyn Transport>;
