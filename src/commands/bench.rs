//! Ping-pong throughput loop.

use std::time::Duration;

use crossterm::style::Stylize;

use super::{close, random_probe, CommandResult, Context};

pub fn run(ctx: &Context, seconds: u64) -> CommandResult {
    let probe = random_probe();
    let session = ctx.connect(&probe)?;
    let ack = session.config().ack_enabled;

    let result = hidlink::bench::run(&session, &probe, Duration::from_secs(seconds), |rate| {
        println!(
            "Ping pong transfer speed (unidirectional): {} B/s",
            rate.unidirectional.to_string().bold()
        );
        println!(
            "Ping pong transfer speed (bidirectional cumulated{}): {} B/s",
            if ack { ", acks included" } else { "" },
            rate.cumulated.to_string().bold()
        );
    });
    close(&session);

    let summary = result?;
    println!(
        "{} round trips in {:.1?}",
        summary.round_trips,
        summary.elapsed
    );
    Ok(())
}
