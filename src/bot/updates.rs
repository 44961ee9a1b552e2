//! Derived cache updates run before plugins see an event.

use tracing::debug;

use super::Handler;
use crate::events::{ContentKind, Ctx, EventName, EventType};

/// Refresh group metadata, contact names and ephemeral timers from `ctx`.
///
/// Errors are returned to the dispatcher, which logs them and keeps going.
pub async fn update_data(handler: &Handler, ctx: &Ctx) -> anyhow::Result<()> {
    match ctx.event_name {
        EventName::GroupsUpsert | EventName::GroupsUpdate | EventName::GroupParticipantsUpdate => {
            let Some(chat) = ctx.chat.as_deref() else {
                return Ok(());
            };
            let meta = handler
                .groups()
                .refresh(handler.socket().as_ref(), chat)
                .await?;
            handler
                .timers()
                .set(chat, meta.ephemeral_duration.unwrap_or(0));
        }

        EventName::ContactsUpsert | EventName::ContactsUpdate => {
            if let (Some(jid), Some(name)) = (ctx.sender.as_deref(), ctx.sender_name.as_deref()) {
                handler.contacts().upsert(jid, name);
            }
        }

        EventName::MessagesUpsert => {
            let Some(chat) = ctx.chat.as_deref() else {
                return Ok(());
            };

            if ctx.content_type == Some(ContentKind::Protocol) {
                if let Some(secs) = ctx.expiration {
                    debug!("Chat {} changed its timer to {}s", chat, secs);
                    handler.timers().set(chat, secs);
                }
            } else if ctx.from_me
                && ctx.event_type != Some(EventType::Append)
                && ctx.content_type.is_some()
                && ctx.content_type != Some(ContentKind::SenderKeyDistribution)
                && let Some(secs) = ctx.expiration
            {
                handler.timers().set(chat, secs);
            }

            if !ctx.from_me
                && let (Some(sender), Some(push_name)) =
                    (ctx.sender.as_deref(), ctx.push_name.as_deref())
            {
                handler.contacts().upsert(sender, push_name);
            }
        }

        _ => {}
    }

    Ok(())
}
