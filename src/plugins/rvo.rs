//! Read-view-once command plugin.
//!
//! Relays the quoted view-once message back into the chat with the
//! view-once flag cleared.

use std::sync::Arc;

use serde_json::Value;

use super::{Plugin, PluginError, PluginUnit};
use crate::events::{Ctx, EventName};
use crate::permissions::midware::{event_is, from_me};
use crate::permissions::midware_and;
use crate::socket::RelayOptions;

pub const LOCATION: &str = "builtin://rvo";

const VIEW_ONCE_WRAPPERS: &[&str] = &[
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
];

pub fn unit() -> Result<PluginUnit, PluginError> {
    let plugin = Plugin::builder()
        .commands(["rvo", "readviewonce"])
        .timeout(15)
        .cat("whatsapp")
        .desc("Read view once messages")
        .midware(midware_and([
            event_is(&[EventName::MessagesUpsert]),
            from_me(),
        ]))
        .exec(rvo_command)
        .build()?;

    Ok(PluginUnit::new(LOCATION, vec![plugin]))
}

async fn rvo_command(ctx: Arc<Ctx>) -> anyhow::Result<()> {
    let (Some(chat), Some(quoted)) = (ctx.chat.as_deref(), ctx.quoted_message.clone()) else {
        ctx.reply("Reply to a view once message.").await?;
        return Ok(());
    };

    let Some(message) = strip_view_once(quoted) else {
        return Ok(());
    };
    ctx.relay_message(chat, message, RelayOptions::default())
        .await?;

    Ok(())
}

/// Unwrap a view-once message and clear its view-once markers.
fn strip_view_once(quoted: Value) -> Option<Value> {
    let mut message = quoted;
    for wrapper in VIEW_ONCE_WRAPPERS {
        if let Some(inner) = message.get(*wrapper).and_then(|w| w.get("message")) {
            message = inner.clone();
            break;
        }
    }

    let map = message.as_object_mut()?;
    map.remove("messageContextInfo");
    for value in map.values_mut() {
        if let Some(content) = value.as_object_mut() {
            if content.contains_key("viewOnce") {
                content.insert("viewOnce".to_string(), Value::Bool(false));
            }
            content.remove("scansSidecar");
        }
    }

    if map.is_empty() { None } else { Some(message) }
}
