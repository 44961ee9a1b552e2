//! Midware - composable gates deciding whether a plugin runs.
//!
//! A gate is any `Fn(&Ctx) -> Reason`. Plain boolean predicates are lifted
//! with [`gate`], and gates nest freely through [`midware_and`],
//! [`midware_or`] and [`not`].
//!
//! ```rust
//! let only_me_or_owner = midware_and([
//!     event_is(&[EventName::MessagesUpsert]),
//!     midware_or([from_me(), from_owner()]),
//! ]);
//! ```

use std::sync::Arc;

use crate::events::{ContentKind, Ctx, EventName};

use super::Reason;

/// A gate over an event context.
pub type Midware = Arc<dyn Fn(&Ctx) -> Reason + Send + Sync>;

const AUTHOR: &str = "midware";

/// Content types only official business clients produce.
const OFFICIAL_ONLY_TYPES: &[&str] = &[
    "buttonsMessage",
    "botInvokeMessage",
    "interactiveResponseMessage",
];

/// Participant used by server-side automation.
const SERVER_PARTICIPANT: &str = "0@s.whatsapp.net";

/// Lift a predicate returning a `Reason` or a `bool` into a gate.
pub fn gate<F, R>(predicate: F) -> Midware
where
    F: Fn(&Ctx) -> R + Send + Sync + 'static,
    R: Into<Reason>,
{
    Arc::new(move |ctx| predicate(ctx).into())
}

/// Run gates in order and return the first failure.
///
/// Gates after a failure are not called. When all pass, a synthesized
/// passing reason is returned.
pub fn midware_and(gates: impl IntoIterator<Item = Midware>) -> Midware {
    let gates: Vec<Midware> = gates.into_iter().collect();
    Arc::new(move |ctx| {
        for gate in &gates {
            let reason = gate(ctx);
            if !reason.success {
                return reason;
            }
        }
        Reason::pass("midware-and").author(AUTHOR)
    })
}

/// Run gates in order and return the first success.
///
/// Gates after a success are not called. When all fail, a synthesized
/// failing reason is returned.
pub fn midware_or(gates: impl IntoIterator<Item = Midware>) -> Midware {
    let gates: Vec<Midware> = gates.into_iter().collect();
    Arc::new(move |ctx| {
        for gate in &gates {
            let reason = gate(ctx);
            if reason.success {
                return reason;
            }
        }
        Reason::fail("midware-or")
            .author(AUTHOR)
            .message("no alternative passed")
    })
}

/// Invert a gate.
pub fn not(inner: Midware) -> Midware {
    Arc::new(move |ctx| {
        let reason = inner(ctx);
        if reason.success {
            Reason::fail("midware-not")
                .author(AUTHOR)
                .message(format!("{} passed", reason.code))
        } else {
            Reason::pass("midware-not").author(AUTHOR)
        }
    })
}

fn check(ok: bool, code: &str, message: &str) -> Reason {
    if ok {
        Reason::pass(code).author(AUTHOR)
    } else {
        Reason::fail(code).author(AUTHOR).message(message)
    }
}

/// Pass for the listed event kinds.
pub fn event_is(names: &[EventName]) -> Midware {
    let names = names.to_vec();
    Arc::new(move |ctx| {
        check(
            names.contains(&ctx.event_name),
            "event-is",
            &format!("event {} not accepted", ctx.event_name),
        )
    })
}

/// Pass for events authored by the bot's own account.
pub fn from_me() -> Midware {
    Arc::new(|ctx| check(ctx.from_me, "from-me", "not sent by this account"))
}

/// Pass for senders listed as owners.
pub fn from_owner() -> Midware {
    Arc::new(|ctx| {
        let owner = ctx
            .sender
            .as_deref()
            .is_some_and(|jid| ctx.handler().permissions().is_owner(jid));
        check(owner, "from-owner", "sender is not an owner")
    })
}

/// Pass for group admins.
pub fn is_admin() -> Midware {
    Arc::new(|ctx| check(ctx.is_admin, "is-admin", "sender is not a group admin"))
}

/// Pass for group chats.
pub fn is_group() -> Midware {
    Arc::new(|ctx| check(ctx.is_group, "is-group", "not a group chat"))
}

/// Pass for one-to-one chats.
pub fn is_private() -> Midware {
    Arc::new(|ctx| {
        check(
            !ctx.is_group && !ctx.is_status,
            "is-private",
            "not a private chat",
        )
    })
}

/// Pass for status broadcasts.
pub fn is_status() -> Midware {
    Arc::new(|ctx| check(ctx.is_status, "is-status", "not a status broadcast"))
}

/// Pass when the context carries a registered command.
pub fn is_cmd() -> Midware {
    Arc::new(|ctx| check(ctx.is_cmd, "is-cmd", "not a command"))
}

/// Pass for the listed content types (e.g. `imageMessage`).
pub fn type_is(types: &[&str]) -> Midware {
    let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    Arc::new(move |ctx| {
        let matched = ctx
            .content_type
            .as_ref()
            .is_some_and(|kind| types.iter().any(|t| t == kind.as_str()));
        check(matched, "type-is", "content type not accepted")
    })
}

/// Pass for the listed chats.
pub fn chat_is(chats: &[&str]) -> Midware {
    let chats: Vec<String> = chats.iter().map(|c| c.to_string()).collect();
    Arc::new(move |ctx| {
        let matched = ctx
            .chat
            .as_deref()
            .is_some_and(|chat| chats.iter().any(|c| c == chat));
        check(matched, "chat-is", "chat not accepted")
    })
}

/// Whether a message looks like it came from an automated client.
///
/// Official clients produce uppercase hex message ids; anything else, an
/// official-only content type, or the server participant gives it away.
pub fn is_bot_like(ctx: &Ctx) -> bool {
    if let Some(id) = ctx.id.as_deref() {
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return true;
        }
        if id.chars().any(|c| c.is_ascii_lowercase()) {
            return true;
        }
    }

    let official_only = ctx
        .content_type
        .as_ref()
        .is_some_and(|kind| OFFICIAL_ONLY_TYPES.contains(&kind.as_str()));
    if official_only {
        return true;
    }

    ctx.participant.as_deref() == Some(SERVER_PARTICIPANT)
        || ctx.sender.as_deref() == Some(SERVER_PARTICIPANT)
}

/// Pass for messages that look automated.
pub fn looks_like_bot() -> Midware {
    Arc::new(|ctx| check(is_bot_like(ctx), "looks-like-bot", "looks like a person"))
}

/// Pass for messages whose content is not the internal key-distribution type.
pub fn not_housekeeping() -> Midware {
    Arc::new(|ctx| {
        let housekeeping = matches!(ctx.content_type, Some(ContentKind::SenderKeyDistribution));
        check(!housekeeping, "not-housekeeping", "key distribution message")
    })
}

/// Look up a predefined gate by name.
pub fn named(name: &str) -> Option<Midware> {
    let gate = match name {
        "from_me" => from_me(),
        "from_owner" => from_owner(),
        "is_admin" => is_admin(),
        "is_group" => is_group(),
        "is_private" => is_private(),
        "is_status" => is_status(),
        "is_cmd" => is_cmd(),
        "looks_like_bot" => looks_like_bot(),
        "not_housekeeping" => not_housekeeping(),
        _ => return None,
    };
    Some(gate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::Handler;
    use crate::events::EventType;
    use crate::socket::testing::RecordingSocket;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn handler() -> Handler {
        Handler::builder(Arc::new(RecordingSocket::new("628000@s.whatsapp.net", "9000@lid")))
            .owners(vec!["628777@s.whatsapp.net".to_string()])
            .build()
    }

    fn message(handler: &Handler, from_me: bool, participant: &str, id: &str) -> Ctx {
        Ctx::build(
            json!({
                "key": {"remoteJid": "120363@g.us", "fromMe": from_me, "id": id, "participant": participant},
                "message": {"conversation": "hello"}
            }),
            EventName::MessagesUpsert,
            Some(EventType::Notify),
            handler,
        )
    }

    #[test]
    fn test_and_short_circuits_on_first_failure() {
        let handler = handler();
        let ctx = message(&handler, false, "628111@s.whatsapp.net", "3EB0AA");

        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let never = gate(move |_: &Ctx| {
            flag.store(true, Ordering::SeqCst);
            true
        });

        let reason = midware_and([from_me(), never])(&ctx);
        assert!(!reason.success);
        assert_eq!(reason.code, "from-me");
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_and_passes_with_synthesized_reason() {
        let handler = handler();
        let ctx = message(&handler, true, "", "3EB0AA");

        let reason = midware_and([from_me(), event_is(&[EventName::MessagesUpsert])])(&ctx);
        assert!(reason.success);
        assert_eq!(reason.code, "midware-and");
    }

    #[test]
    fn test_or_returns_first_success() {
        let handler = handler();
        let ctx = message(&handler, false, "628111@s.whatsapp.net", "3EB0AA");

        let reason = midware_or([from_me(), gate(|_: &Ctx| Reason::pass("custom"))])(&ctx);
        assert!(reason.success);
        assert_eq!(reason.code, "custom");

        let reason = midware_or([from_me(), from_owner()])(&ctx);
        assert!(!reason.success);
        assert_eq!(reason.code, "midware-or");
    }

    #[test]
    fn test_owner_and_nesting() {
        let handler = handler();
        let ctx = message(&handler, false, "628777@s.whatsapp.net", "3EB0AA");

        let gate = midware_and([
            event_is(&[EventName::MessagesUpsert]),
            midware_or([from_me(), from_owner()]),
            not(is_status()),
        ]);
        assert!(gate(&ctx).success);
    }

    #[test]
    fn test_bot_like_ids() {
        let handler = handler();
        assert!(!is_bot_like(&message(&handler, false, "628111@s.whatsapp.net", "3EB0C0FFEE")));
        assert!(is_bot_like(&message(&handler, false, "628111@s.whatsapp.net", "BAE5abcdef")));
        assert!(is_bot_like(&message(&handler, false, "628111@s.whatsapp.net", "NOTHEX-1")));
        assert!(is_bot_like(&message(&handler, false, "0@s.whatsapp.net", "3EB0")));
    }
}
