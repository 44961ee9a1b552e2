//! Ephemeral timer command plugin.
//!
//! Without arguments the chat's timer is synced from the command message's
//! own expiration. With a duration (`7d`, `24h`, `off`) the timer is
//! changed on the chat and in the cache.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use super::{Plugin, PluginError, PluginUnit};
use crate::events::{Ctx, EventName};
use crate::permissions::midware::{event_is, from_me, from_owner};
use crate::permissions::{midware_and, midware_or};
use crate::socket::SendOptions;
use crate::utils::{format_elapse, parse_duration_secs};

pub const LOCATION: &str = "builtin://timer";

pub fn unit() -> Result<PluginUnit, PluginError> {
    let plugin = Plugin::builder()
        .command("timer")
        .timeout(15)
        .cat("system")
        .tags(["system"])
        .desc("Set or sync the chat ephemeral timer.")
        .midware(midware_and([
            event_is(&[EventName::MessagesUpsert]),
            midware_or([from_me(), from_owner()]),
        ]))
        .exec(timer_command)
        .build()?;

    Ok(PluginUnit::new(LOCATION, vec![plugin]))
}

fn describe(secs: u32) -> String {
    if secs == 0 {
        "off".to_string()
    } else {
        format_elapse(secs as i64 * 1000)
    }
}

async fn timer_command(ctx: Arc<Ctx>) -> anyhow::Result<()> {
    let Some(chat) = ctx.chat.clone() else {
        return Ok(());
    };
    let timers = ctx.handler().timers();
    let latest = timers.get(&chat).unwrap_or(0);

    let Some(args) = ctx.args.as_deref() else {
        let secs = ctx.expiration.unwrap_or(0);
        debug!("Syncing timer for {} from {} to {}", chat, latest, secs);
        timers.set(&chat, secs);
        ctx.reply(format!("Timer : {} -> {}", describe(latest), describe(secs)))
            .await?;
        return Ok(());
    };

    let Some(secs) = parse_duration_secs(args) else {
        ctx.reply("Usage: timer [duration], e.g. `timer 7d` or `timer off`")
            .await?;
        return Ok(());
    };

    ctx.send_message(
        &chat,
        json!({ "disappearingMessagesInChat": secs }),
        SendOptions::default(),
    )
    .await?;
    timers.set(&chat, secs);
    ctx.reply(format!("Timer : {} -> {}", describe(latest), describe(secs)))
        .await?;

    Ok(())
}
