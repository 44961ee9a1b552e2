//! Event log listener.
//!
//! Prints one line per event with quick markers:
//! 🛡️ admin, ⚡ command, ❌ command gate failed, ⚠️ duplicate id,
//! 🤖 bot-like id, 🥷 lid sender.

use std::sync::Arc;

use tracing::info;

use super::{Plugin, PluginError, PluginUnit};
use crate::events::{ContentKind, Ctx, EventName, EventType};
use crate::permissions::midware::{gate, is_bot_like};
use crate::utils::{clean_name, format_elapse, now_millis, slice_middle};

pub const LOCATION: &str = "builtin://log";

pub fn unit() -> Result<PluginUnit, PluginError> {
    let plugin = Plugin::builder()
        .desc("Log every event to the console")
        .midware(gate(|ctx: &Ctx| ctx.event_name != EventName::ContactsUpdate))
        .exec(log_listener)
        .build()?;

    Ok(PluginUnit::new(LOCATION, vec![plugin]))
}

async fn log_listener(ctx: Arc<Ctx>) -> anyhow::Result<()> {
    info!("{}", summary(&ctx, now_millis()));
    Ok(())
}

fn summary(ctx: &Ctx, now: i64) -> String {
    let mut parts: Vec<String> = Vec::new();
    let chat_name = clean_name(ctx.chat_name.as_deref().or(ctx.chat.as_deref()).unwrap_or(""));
    let sender_name = clean_name(
        ctx.sender_name
            .as_deref()
            .or(ctx.sender.as_deref())
            .unwrap_or(""),
    );

    match ctx.event_type {
        Some(EventType::Append) => parts.push("📩".into()),
        Some(EventType::Notify) => parts.push("📧".into()),
        _ => {}
    }

    match ctx.event_name {
        EventName::PresenceUpdate => {
            let presence = match ctx.presence.as_deref() {
                Some("composing") => "✍️",
                Some("recording") => "🎤",
                Some(other) => other,
                None => "",
            };
            parts.push(presence.to_string());
            parts.push(format!("{} < {}", chat_name, sender_name));
        }

        EventName::MessagesUpsert | EventName::MessagesReaction => {
            if ctx.is_admin {
                parts.push("🛡️".into());
            }
            if ctx.is_cmd {
                parts.push("⚡".into());
                let passed = ctx
                    .pattern
                    .as_deref()
                    .and_then(|p| ctx.handler().resolve(p))
                    .is_some_and(|plugin| plugin.check_at(ctx, now).success);
                if !passed {
                    parts.push("❌".into());
                }
            }
            if ctx.duplicate {
                parts.push("⚠️".into());
            }
            if is_bot_like(ctx) {
                parts.push("🤖".into());
            }
            if ctx.sender.as_deref().is_some_and(|s| s.ends_with("@lid")) {
                parts.push("🥷".into());
            }

            parts.push(format_elapse(now - ctx.timestamp));
            if let Some(stanza) = ctx.stanza_id.as_deref() {
                parts.push(format!("{} <<", slice_middle(stanza, 8, "-")));
            }
            parts.push(slice_middle(ctx.id.as_deref().unwrap_or(""), 8, "-"));

            let kind = ctx
                .content_type
                .as_ref()
                .map(ContentKind::as_str)
                .unwrap_or("")
                .replace("Message", "");
            parts.push(kind);
            parts.push(format!("{} < {}", chat_name, sender_name));

            let text: String = ctx
                .text
                .as_deref()
                .unwrap_or("")
                .chars()
                .take(100)
                .collect();
            parts.push(text.replace('\n', " "));
        }

        EventName::GroupParticipantsUpdate => {
            parts.push("👥".into());
            let action = match ctx.action.as_deref() {
                Some("invite") | Some("add") => "⤵️",
                Some("promote") => "⬆️",
                Some("demote") => "⬇️",
                Some("leave") | Some("remove") => "⤴️",
                Some(other) => other,
                None => "",
            };
            parts.push(action.to_string());
            parts.push(format!("{} < {}", chat_name, sender_name));
            parts.push(ctx.participants.join(", "));
        }

        EventName::Call => {
            parts.push("📞".into());
            parts.push(ctx.call_status.clone().unwrap_or_default());
            parts.push(format!("from {}", chat_name));
        }

        other => parts.push(other.to_string()),
    }

    parts.retain(|p| !p.is_empty());
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Handler;
    use crate::socket::testing::RecordingSocket;
    use serde_json::json;

    #[test]
    fn test_message_summary_markers() {
        let handler = Handler::builder(Arc::new(RecordingSocket::new("628000@s.whatsapp.net", "9000@lid")))
            .prefixes(vec![".".into()])
            .build();
        handler.install(super::super::ping::unit().unwrap());

        let mut ctx = Ctx::build(
            json!({
                "key": {"remoteJid": "628111@s.whatsapp.net", "id": "3EB0ABCDEF123456"},
                "message": {"extendedTextMessage": {"text": ".ping\nnow"}},
                "messageTimestamp": 1700000000,
                "pushName": "Budi"
            }),
            EventName::MessagesUpsert,
            Some(EventType::Notify),
            &handler,
        );
        ctx.duplicate = true;

        let line = summary(&ctx, 1_700_000_000_250);
        assert_eq!(
            line,
            "📧 ⚡ ❌ ⚠️ 250ms 3EB0-3456 extendedText Budi < Budi .ping now"
        );
    }

    #[test]
    fn test_other_events_use_name() {
        let handler = Handler::builder(Arc::new(RecordingSocket::new("1@s.whatsapp.net", "1@lid"))).build();
        let ctx = Ctx::build(
            json!({"id": "1@g.us", "subject": "Group"}),
            EventName::GroupsUpdate,
            None,
            &handler,
        );
        assert_eq!(summary(&ctx, 0), "groups.update");
    }
}
