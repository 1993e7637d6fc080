//! Host tool configuration
//!
//! Stored as TOML under the user's config directory. Every field is optional
//! in the file; command-line flags take precedence over file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hidlink_transport::protocol::timing;
use hidlink_transport::{ReservedCommands, RetryLimit, SessionConfig};
use serde::{Deserialize, Serialize};

/// Default USB vendor ID (pid.codes)
pub const DEFAULT_VID: u16 = 0x1209;
/// Default USB product ID
pub const DEFAULT_PID: u16 = 0x4321;

/// Persistent settings for the `hidlink` tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub vid: u16,
    pub pid: u16,
    /// Reply read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Request a low-level ack for every packet
    pub ack: bool,
    /// Busy retransmissions before giving up; absent means retry forever
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy_retry_limit: Option<u32>,
    pub reserved: ReservedCommands,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            vid: DEFAULT_VID,
            pid: DEFAULT_PID,
            read_timeout_ms: timing::DEFAULT_READ_TIMEOUT_MS,
            ack: false,
            busy_retry_limit: None,
            reserved: ReservedCommands::default(),
        }
    }
}

/// Values given on the command line; `None` keeps the file value
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub read_timeout_ms: Option<u64>,
    pub ack: bool,
}

impl HostConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hidlink")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(vid) = overrides.vid {
            self.vid = vid;
        }
        if let Some(pid) = overrides.pid {
            self.pid = pid;
        }
        if let Some(ms) = overrides.read_timeout_ms {
            self.read_timeout_ms = ms;
        }
        self.ack |= overrides.ack;
        self
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_ack(self.ack)
            .with_busy_retry(RetryLimit::from(self.busy_retry_limit))
            .with_reserved(self.reserved)
    }
}

/// Parse a USB ID given as hex, with or without a `0x` prefix
pub fn parse_usb_id(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid USB ID '{s}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hidlink_transport::cmd;

    #[test]
    fn test_empty_file_is_default() {
        let config: HostConfig = toml::from_str("").unwrap();
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let config: HostConfig = toml::from_str(
            r#"
pid = 0x4322
busy_retry_limit = 5

[reserved]
retry = 0x00F2
"#,
        )
        .unwrap();
        assert_eq!(config.vid, DEFAULT_VID);
        assert_eq!(config.pid, 0x4322);
        assert_eq!(config.busy_retry_limit, Some(5));
        assert_eq!(config.reserved.retry, 0x00F2);
        assert_eq!(config.reserved.debug_message, cmd::DEBUG_MESSAGE);
    }

    #[test]
    fn test_roundtrip() {
        let config = HostConfig {
            ack: true,
            busy_retry_limit: Some(3),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: HostConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_flags_override_file() {
        let file = HostConfig {
            pid: 0x1111,
            read_timeout_ms: 900,
            ..Default::default()
        };
        let merged = file.apply(Overrides {
            pid: Some(0x2222),
            ack: true,
            ..Default::default()
        });
        assert_eq!(merged.pid, 0x2222);
        assert_eq!(merged.read_timeout_ms, 900);
        assert!(merged.ack);

        let session = merged.to_session_config();
        assert!(session.ack_enabled);
        assert_eq!(session.read_timeout, Duration::from_millis(900));
        assert_eq!(session.busy_retry, RetryLimit::Unbounded);
    }

    #[test]
    fn test_parse_usb_id() {
        assert_eq!(parse_usb_id("0x1209"), Ok(0x1209));
        assert_eq!(parse_usb_id("4321"), Ok(0x4321));
        assert!(parse_usb_id("xyz").is_err());
    }
}
