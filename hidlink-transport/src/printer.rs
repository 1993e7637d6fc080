//! PrinterTransport middleware for monitoring packet traffic
//!
//! Wraps any Transport and prints every packet passing through it, decoded
//! into its framing fields.
//!
//! # Example
//!
//! ```ignore
//! use hidlink_transport::{HidTransport, PrinterConfig, PrinterTransport};
//!
//! let transport = HidTransport::open(&api, &device)?;
//! let monitored = PrinterTransport::wrap(Arc::new(transport), PrinterConfig::default());
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crossterm::style::Stylize;
use serde::Serialize;

use crate::codec::{Packet, SubHeader};
use crate::protocol::{cmd, FLIP_BIT_RESET_MARKER};
use crate::{Transport, TransportDeviceInfo, TransportError};

/// Output format for the printer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Direction filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketFilter {
    #[default]
    All,
    Outgoing,
    Incoming,
}

impl FromStr for PacketFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "tx" | "out" | "outgoing" => Ok(Self::Outgoing),
            "rx" | "in" | "incoming" => Ok(Self::Incoming),
            _ => Err(format!("Unknown filter: {}", s)),
        }
    }
}

/// Configuration for the PrinterTransport
#[derive(Debug, Clone, Default)]
pub struct PrinterConfig {
    /// Show raw hex dump alongside decoded output
    pub show_hex: bool,
    pub filter: PacketFilter,
    pub format: OutputFormat,
}

impl PrinterConfig {
    pub fn with_hex(mut self, show: bool) -> Self {
        self.show_hex = show;
        self
    }

    pub fn with_filter(mut self, filter: PacketFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Tx,
    Rx,
}

/// Framing fields of one packet, as printed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedPacket {
    pub direction: Direction,
    /// The `FF FF` flip-bit reset marker
    pub reset_marker: bool,
    pub flip: bool,
    pub ack: bool,
    pub index: u8,
    pub total: u8,
    pub payload_len: usize,
    /// Sub-header of a stream's first packet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecodedPacket {
    pub fn decode(direction: Direction, bytes: &[u8]) -> Self {
        let mut decoded = Self {
            direction,
            reset_marker: false,
            flip: false,
            ack: false,
            index: 0,
            total: 0,
            payload_len: 0,
            command: None,
            length: None,
            error: None,
        };

        if bytes.starts_with(&FLIP_BIT_RESET_MARKER) && direction == Direction::Tx {
            decoded.reset_marker = true;
            return decoded;
        }

        match Packet::from_bytes(bytes) {
            Ok(packet) => {
                decoded.flip = packet.flip_bit().bits() != 0;
                decoded.ack = packet.ack_requested();
                decoded.index = packet.index();
                decoded.total = packet.total();
                decoded.payload_len = packet.payload_len();
                if packet.index() == 0 {
                    if let Ok(sub) = SubHeader::parse(packet.payload()) {
                        decoded.command = Some(sub.command());
                        decoded.length = Some(sub.length());
                    }
                }
            }
            Err(e) => decoded.error = Some(e.to_string()),
        }
        decoded
    }
}

/// Transport middleware that prints all packets
pub struct PrinterTransport {
    inner: Arc<dyn Transport>,
    config: PrinterConfig,
}

impl PrinterTransport {
    /// Wrap a transport with printing middleware
    pub fn wrap(transport: Arc<dyn Transport>, config: PrinterConfig) -> Arc<dyn Transport> {
        Arc::new(Self {
            inner: transport,
            config,
        })
    }

    fn should_show(&self, direction: Direction) -> bool {
        match self.config.filter {
            PacketFilter::All => true,
            PacketFilter::Outgoing => direction == Direction::Tx,
            PacketFilter::Incoming => direction == Direction::Rx,
        }
    }

    fn print(&self, direction: Direction, bytes: &[u8]) {
        if !self.should_show(direction) {
            return;
        }
        let decoded = DecodedPacket::decode(direction, bytes);

        if self.config.format == OutputFormat::Json {
            if let Ok(line) = serde_json::to_string(&decoded) {
                eprintln!("{}", line);
            }
            return;
        }

        let arrow = match direction {
            Direction::Tx => ">>>".cyan(),
            Direction::Rx => "<<<".green(),
        };

        if decoded.reset_marker {
            eprintln!("{} {}", arrow, "FLIP-BIT RESET".magenta().bold());
        } else if let Some(ref err) = decoded.error {
            eprintln!("{} {}  {}", arrow, "BAD".red().bold(), err);
        } else {
            let flags = format!(
                "{}{}",
                if decoded.flip { "F" } else { "-" },
                if decoded.ack { "A" } else { "-" }
            );
            let mut line = format!(
                "{} {} {}/{} len={}",
                arrow,
                flags.yellow(),
                decoded.index + 1,
                decoded.total,
                decoded.payload_len
            );
            if let (Some(command), Some(length)) = (decoded.command, decoded.length) {
                line.push_str(&format!(
                    "  0x{:04X} {} ({} bytes)",
                    command,
                    cmd::name(command).bold(),
                    length
                ));
            }
            eprintln!("{}", line);
        }

        if self.config.show_hex {
            let shown = if decoded.reset_marker {
                &bytes[..FLIP_BIT_RESET_MARKER.len()]
            } else {
                &bytes[..bytes.len().min(2 + decoded.payload_len)]
            };
            eprintln!("    {}  {:02x?}", "HEX".dim(), shown);
        }
    }
}

impl Transport for PrinterTransport {
    fn send_packet(&self, packet: &[u8]) -> Result<(), TransportError> {
        self.print(Direction::Tx, packet);
        self.inner.send_packet(packet)
    }

    fn read_packet(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let packet = self.inner.read_packet(timeout)?;
        self.print(Direction::Rx, &packet);
        Ok(packet)
    }

    fn reset(&self) -> Result<(), TransportError> {
        self.inner.reset()
    }

    fn dispose(&self) -> Result<(), TransportError> {
        self.inner.dispose()
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        self.inner.device_info()
    }
}
