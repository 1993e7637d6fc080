//! Command handlers for the CLI application.
//!
//! - `devices`: list matching HID interfaces
//! - `ping`: handshake plus one ping exchange
//! - `status`: handshake plus a device status query
//! - `bench`: ping-pong throughput loop

pub mod bench;
pub mod devices;
pub mod ping;
pub mod status;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use hidlink::config::HostConfig;
use hidlink_transport::protocol::timing;
use hidlink_transport::{
    cmd, CancelToken, HidTransport, Message, OutputFormat, PacketFilter, PrinterConfig,
    PrinterTransport, Session, Transport,
};
use rand::Rng;
use tracing::{info, warn};

/// Result type for command handlers
pub type CommandResult = anyhow::Result<()>;

/// Everything a command needs to reach the device
pub struct Context {
    pub config: HostConfig,
    pub printer: Option<PrinterConfig>,
    pub cancel: CancelToken,
}

impl Context {
    /// Open the first matching device, wrapped with the printer when monitoring
    pub fn open_transport(&self) -> anyhow::Result<Arc<dyn Transport>> {
        let hid = HidTransport::open_first(self.config.vid, self.config.pid).with_context(|| {
            format!(
                "opening {:04X}:{:04X}",
                self.config.vid, self.config.pid
            )
        })?;
        // Give the device time to settle before the first write
        std::thread::sleep(Duration::from_millis(timing::POST_OPEN_DELAY_MS));

        let transport: Arc<dyn Transport> = Arc::new(hid);
        Ok(match &self.printer {
            Some(printer) => PrinterTransport::wrap(transport, printer.clone()),
            None => transport,
        })
    }

    /// Open the device and run the handshake with `probe`
    pub fn connect(&self, probe: &Message) -> anyhow::Result<Session> {
        let transport = self.open_transport()?;
        let session = Session::connect(
            transport,
            probe,
            self.config.to_session_config(),
            self.cancel.clone(),
        )
        .context("handshake failed")?;
        Ok(session)
    }
}

/// Ping message with a random 4-byte payload
pub fn random_probe() -> Message {
    let payload: [u8; 4] = rand::thread_rng().gen();
    Message::new(cmd::PING, payload.to_vec())
}

/// Disconnect, logging instead of failing
pub fn close(session: &Session) {
    if let Err(e) = session.disconnect() {
        warn!("Disconnect failed: {}", e);
    }
}

/// Set up a Ctrl-C handler that cancels the given token
pub fn setup_interrupt_handler(cancel: &CancelToken) {
    let token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Interrupted, cancelling");
        token.cancel();
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
}

/// Create printer config from CLI flags
pub fn create_printer_config(
    monitor: bool,
    hex: bool,
    json: bool,
    filter: Option<&str>,
) -> anyhow::Result<Option<PrinterConfig>> {
    if !monitor {
        return Ok(None);
    }

    let filter = match filter {
        Some(f) => f.parse::<PacketFilter>().map_err(anyhow::Error::msg)?,
        None => PacketFilter::All,
    };
    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    Ok(Some(
        PrinterConfig::default()
            .with_hex(hex)
            .with_filter(filter)
            .with_format(format),
    ))
}

/// Hex dump as printed by the commands
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
