//! hidlink CLI
//!
//! Talks to devices using the 64-byte HID message framing protocol.

use clap::Parser;
use hidlink::config::{HostConfig, Overrides};
use hidlink_transport::CancelToken;
use tracing::{debug, info};

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(HostConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let config = HostConfig::load(&config_path)?.apply(Overrides {
        vid: cli.vid,
        pid: cli.pid,
        read_timeout_ms: cli.timeout_ms,
        ack: cli.ack,
    });

    let printer =
        commands::create_printer_config(cli.monitor, cli.hex, cli.json, cli.filter.as_deref())?;
    if printer.is_some() {
        info!("Monitor mode enabled - printing all packets");
    }

    let cancel = CancelToken::new();
    commands::setup_interrupt_handler(&cancel);

    let ctx = commands::Context {
        config,
        printer,
        cancel,
    };

    match cli.command {
        Commands::Devices => commands::devices::run(&ctx.config),
        Commands::Ping { payload } => commands::ping::run(&ctx, payload.map(|p| p.0)),
        Commands::Status => commands::status::run(&ctx),
        Commands::Bench { seconds } => commands::bench::run(&ctx, seconds),
        Commands::SaveConfig => {
            ctx.config.save(&config_path)?;
            println!("Saved configuration to {}", config_path.display());
            Ok(())
        }
    }
}
