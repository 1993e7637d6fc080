//! Handshake plus one ping exchange.

use std::time::Instant;

use anyhow::bail;
use hidlink_transport::{cmd, Message};

use super::{close, hex, random_probe, CommandResult, Context};

pub fn run(ctx: &Context, payload: Option<Vec<u8>>) -> CommandResult {
    let probe = match payload {
        Some(bytes) => Message::new(cmd::PING, bytes),
        None => random_probe(),
    };
    let session = ctx.connect(&probe)?;
    println!("Connected to {}", session.transport().device_info().device_path);

    let start = Instant::now();
    let result = session.request(&probe, true);
    let elapsed = start.elapsed();
    close(&session);

    let reply = result?;
    if reply != probe {
        bail!(
            "ping reply mismatch: sent [{}], got 0x{:04X} [{}]",
            hex(probe.payload()),
            reply.command(),
            hex(reply.payload())
        );
    }
    println!("Ping [{}] answered in {:?}", hex(probe.payload()), elapsed);
    Ok(())
}
