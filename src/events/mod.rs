//! Event normalisation.
//!
//! The client delivers named event batches. Each batch is split into raw
//! items, and each item becomes one [`Ctx`]:
//!
//! ```text
//! {"event": "messages.upsert", "data": {"type": "notify", "messages": [..]}}
//!     -> EventBatch { name, event_type, items }
//!     -> Ctx::build(item, name, event_type, &handler)
//! ```

mod content;
mod context;
pub mod jid;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

pub use content::ContentKind;
pub use context::Ctx;

/// Supported event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    MessagesUpsert,
    MessagesUpdate,
    MessagesReaction,
    GroupsUpsert,
    GroupsUpdate,
    GroupParticipantsUpdate,
    ContactsUpsert,
    ContactsUpdate,
    PresenceUpdate,
    Call,
}

impl EventName {
    pub const ALL: [EventName; 10] = [
        Self::MessagesUpsert,
        Self::MessagesUpdate,
        Self::MessagesReaction,
        Self::GroupsUpsert,
        Self::GroupsUpdate,
        Self::GroupParticipantsUpdate,
        Self::ContactsUpsert,
        Self::ContactsUpdate,
        Self::PresenceUpdate,
        Self::Call,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessagesUpsert => "messages.upsert",
            Self::MessagesUpdate => "messages.update",
            Self::MessagesReaction => "messages.reaction",
            Self::GroupsUpsert => "groups.upsert",
            Self::GroupsUpdate => "groups.update",
            Self::GroupParticipantsUpdate => "group-participants.update",
            Self::ContactsUpsert => "contacts.upsert",
            Self::ContactsUpdate => "contacts.update",
            Self::PresenceUpdate => "presence.update",
            Self::Call => "call",
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(
            self,
            Self::MessagesUpsert | Self::MessagesUpdate | Self::MessagesReaction
        )
    }

}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| format!("unsupported event: {}", s))
    }
}

/// Delivery subtype of `messages.upsert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// A live message.
    Notify,
    /// A partial or history delivery.
    Append,
    Other(String),
}

impl EventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "notify" => Self::Notify,
            "append" => Self::Append,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Notify => "notify",
            Self::Append => "append",
            Self::Other(s) => s,
        }
    }
}

/// One event as posted by the client bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// A named event batch split into raw items.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    pub name: EventName,
    pub event_type: Option<EventType>,
    pub items: Vec<Value>,
}

impl EventBatch {
    /// Split a raw payload the way the client shapes each event kind.
    ///
    /// `messages.upsert` carries `{type, messages}`; participant and
    /// presence updates carry a single object; everything else carries an
    /// array (a lone object is accepted as a one-item batch).
    pub fn from_raw(name: EventName, data: Value) -> Self {
        match name {
            EventName::MessagesUpsert => {
                let event_type = data
                    .get("type")
                    .and_then(Value::as_str)
                    .map(EventType::parse);
                let items = match data {
                    Value::Object(mut map) => match map.remove("messages") {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    },
                    Value::Array(items) => items,
                    _ => Vec::new(),
                };
                Self {
                    name,
                    event_type,
                    items,
                }
            }
            EventName::GroupParticipantsUpdate | EventName::PresenceUpdate => Self {
                name,
                event_type: None,
                items: if data.is_object() { vec![data] } else { Vec::new() },
            },
            _ => Self {
                name,
                event_type: None,
                items: match data {
                    Value::Array(items) => items,
                    Value::Object(_) => vec![data],
                    _ => Vec::new(),
                },
            },
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl TryFrom<FeedEnvelope> for EventBatch {
    type Error = String;

    fn try_from(envelope: FeedEnvelope) -> Result<Self, Self::Error> {
        let name = envelope.event.parse::<EventName>()?;
        Ok(Self::from_raw(name, envelope.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_name_round_trip() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>(), Ok(name));
        }
        assert!("connection.update".parse::<EventName>().is_err());
    }

    #[test]
    fn test_upsert_batch() {
        let batch = EventBatch::from_raw(
            EventName::MessagesUpsert,
            json!({"type": "append", "messages": [{"key": {}}, {"key": {}}]}),
        );
        assert_eq!(batch.event_type, Some(EventType::Append));
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_single_object_batches() {
        let batch = EventBatch::from_raw(
            EventName::GroupParticipantsUpdate,
            json!({"id": "1@g.us", "participants": ["2@s.whatsapp.net"], "action": "add"}),
        );
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.event_type, None);

        let batch = EventBatch::from_raw(EventName::ContactsUpsert, json!([{"id": "a"}, {"id": "b"}]));
        assert_eq!(batch.len(), 2);

        let batch = EventBatch::from_raw(EventName::Call, json!("garbage"));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_envelope_conversion() {
        let envelope: FeedEnvelope =
            serde_json::from_value(json!({"event": "groups.update", "data": [{"id": "1@g.us"}]}))
                .unwrap();
        let batch = EventBatch::try_from(envelope).unwrap();
        assert_eq!(batch.name, EventName::GroupsUpdate);
        assert_eq!(batch.len(), 1);
    }
}
