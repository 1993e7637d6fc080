//! Device status query.

use hidlink_transport::Message;

use super::{close, hex, random_probe, CommandResult, Context};

pub fn run(ctx: &Context) -> CommandResult {
    let session = ctx.connect(&random_probe())?;
    let status_cmd = session.config().reserved.device_status;

    let result = session.request(&Message::empty(status_cmd), true);
    close(&session);

    let reply = result?;
    println!(
        "Status (0x{:04X}, {} bytes): {}",
        reply.command(),
        reply.len(),
        hex(reply.payload())
    );
    Ok(())
}
