// CLI definitions using clap

use clap::{Parser, Subcommand};
use hidlink::config::parse_usb_id;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hidlink")]
#[command(author, version, about = "Host tool for the 64-byte HID message framing protocol")]
#[command(propagate_version = true)]
pub struct Cli {
    /// USB vendor ID (hex)
    #[arg(long, global = true, value_parser = parse_usb_id)]
    pub vid: Option<u16>,

    /// USB product ID (hex)
    #[arg(long, global = true, value_parser = parse_usb_id)]
    pub pid: Option<u16>,

    /// Reply read timeout in milliseconds
    #[arg(long = "timeout-ms", global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Request a low-level ack for every packet
    #[arg(long, global = true)]
    pub ack: bool,

    /// Print every packet sent and received
    #[arg(long, global = true)]
    pub monitor: bool,

    /// Show raw hex dump alongside decoded output
    #[arg(long, global = true)]
    pub hex: bool,

    /// Monitor filter (all, tx, rx)
    #[arg(long, global = true)]
    pub filter: Option<String>,

    /// Print monitored packets as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List matching HID interfaces
    #[command(visible_aliases = ["list", "ls"])]
    Devices,

    /// Connect and exchange a ping
    Ping {
        /// Probe payload in hex (random 4 bytes if omitted)
        #[arg(long, value_parser = parse_hex_payload)]
        payload: Option<HexBytes>,
    },

    /// Connect and query the device status
    #[command(visible_alias = "st")]
    Status,

    /// Measure ping-pong throughput
    Bench {
        /// How long to run
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },

    /// Write the effective configuration to the config file
    SaveConfig,
}

/// Bytes given on the command line in hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Parse a payload written as hex bytes, e.g. `deadbeef` or `de:ad:be:ef`
pub fn parse_hex_payload(s: &str) -> Result<HexBytes, String> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| !matches!(b, b':' | b' ' | b'-'))
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{s}'"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let nibble = |b: u8| char::from(b).to_digit(16);
            match (nibble(pair[0]), nibble(pair[1])) {
                (Some(hi), Some(lo)) => Ok(((hi << 4) | lo) as u8),
                _ => Err(format!("invalid hex byte in '{s}'")),
            }
        })
        .collect::<Result<_, _>>()
        .map(HexBytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex_payload() {
        assert_eq!(
            parse_hex_payload("deadbeef"),
            Ok(HexBytes(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        );
        assert_eq!(parse_hex_payload("01:02"), Ok(HexBytes(vec![1, 2])));
        assert_eq!(parse_hex_payload(""), Ok(HexBytes(vec![])));
        assert!(parse_hex_payload("abc").is_err());
        assert!(parse_hex_payload("zz").is_err());
        assert!(parse_hex_payload("+1").is_err());
        // Multi-byte characters are rejected, not split
        assert!(parse_hex_payload("a\u{e9}a").is_err());
        assert!(parse_hex_payload("\u{e9}").is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from([
            "hidlink", "ping", "--vid", "0x1209", "--ack", "--payload", "0102",
        ]);
        assert_eq!(cli.vid, Some(0x1209));
        assert!(cli.ack);
        assert!(matches!(cli.command, Commands::Ping { payload: Some(ref p) } if p.0 == [1, 2]));
    }
}
