//! Ping command plugin.
//!
//! Reports how long a command took to reach the bot.

use std::sync::Arc;

use super::{Plugin, PluginError, PluginUnit};
use crate::events::{Ctx, EventName};
use crate::permissions::midware::{event_is, from_me};
use crate::permissions::midware_and;
use crate::utils::{format_elapse, now_millis};

pub const LOCATION: &str = "builtin://ping";

pub fn unit() -> Result<PluginUnit, PluginError> {
    let plugin = Plugin::builder()
        .commands(["ping", "p"])
        .timeout(120)
        .cat("system")
        .tags(["system"])
        .desc("Ping the bot and get the response time.")
        .midware(midware_and([
            event_is(&[EventName::MessagesUpsert]),
            from_me(),
        ]))
        .exec(ping_command)
        .build()?;

    Ok(PluginUnit::new(LOCATION, vec![plugin]))
}

/// Handle the ping command - measures delivery latency.
async fn ping_command(ctx: Arc<Ctx>) -> anyhow::Result<()> {
    let now = now_millis();
    let lag = now - ctx.timestamp;

    // Choose emoji based on latency
    let emoji = if lag < 1000 {
        "🟢"
    } else if lag < 3000 {
        "🟡"
    } else {
        "🔴"
    };

    let text = format!(
        "{} Pong! {}\n\nCurrent : {}\nChat : {}",
        emoji,
        format_elapse(lag),
        now,
        ctx.timestamp
    );
    ctx.reply(text).await?;

    Ok(())
}
