//! Event context.

use std::fmt;

use serde_json::Value;

use super::content::{ContentKind, ephemeral_setting, extract};
use super::{EventName, EventType, jid};
use crate::bot::{Handler, SendError};
use crate::socket::{RelayOptions, SendOptions};
use crate::utils::now_millis;

/// One normalised inbound event.
///
/// Built once per raw item and never mutated after dispatch starts. Fields
/// the event does not carry stay `None`/empty.
pub struct Ctx {
    pub event_name: EventName,
    pub event_type: Option<EventType>,
    /// The raw item.
    pub event: Value,
    /// Event time in milliseconds.
    pub timestamp: i64,

    /// The bot's own jid.
    pub me: Option<String>,
    pub chat: Option<String>,
    pub chat_name: Option<String>,
    pub sender: Option<String>,
    pub sender_name: Option<String>,
    pub push_name: Option<String>,
    pub id: Option<String>,
    pub from_me: bool,

    pub content_type: Option<ContentKind>,
    pub text: Option<String>,
    /// The message object after wrapper unwrapping.
    pub message: Option<Value>,
    /// The payload under `content_type`.
    pub content: Option<Value>,
    pub context_info: Option<Value>,
    pub quoted_message: Option<Value>,
    pub quoted_type: Option<ContentKind>,
    pub quoted_text: Option<String>,
    pub stanza_id: Option<String>,
    pub participant: Option<String>,
    pub mentioned_jid: Vec<String>,
    /// Disappearing-message duration carried by the message, in seconds.
    pub expiration: Option<u32>,

    pub pattern: Option<String>,
    pub args: Option<String>,
    pub is_cmd: bool,

    pub is_group: bool,
    pub is_status: bool,
    pub is_admin: bool,

    /// `add`, `remove`, `promote`, `demote` for participant updates.
    pub action: Option<String>,
    pub participants: Vec<String>,
    pub presence: Option<String>,
    pub call_status: Option<String>,

    /// The message id was seen recently.
    pub duplicate: bool,

    handler: Handler,
}

impl Ctx {
    /// Build a context from one raw event item.
    ///
    /// Cache lookups (group metadata, contact names, command index) go
    /// through `handler`; nothing is fetched from the socket here.
    pub fn build(
        event: Value,
        event_name: EventName,
        event_type: Option<EventType>,
        handler: &Handler,
    ) -> Self {
        let identity = handler.identity();
        let me = identity.id.as_deref().map(jid::normalize);
        let me_lid = identity.lid.as_deref().map(jid::normalize);

        let mut ctx = Self::empty(event_name, event_type, me.clone(), handler.clone());

        match event_name {
            EventName::MessagesUpsert | EventName::MessagesUpdate => ctx.fill_message(&event),
            EventName::MessagesReaction => ctx.fill_reaction(&event),
            EventName::GroupsUpsert | EventName::GroupsUpdate => ctx.fill_group(&event),
            EventName::GroupParticipantsUpdate => ctx.fill_participants(&event),
            EventName::ContactsUpsert | EventName::ContactsUpdate => ctx.fill_contact(&event),
            EventName::PresenceUpdate => ctx.fill_presence(&event),
            EventName::Call => ctx.fill_call(&event),
        }

        if let Some(chat) = ctx.chat.as_deref() {
            ctx.is_group = jid::is_group(chat);
            ctx.is_status = jid::is_status(chat);
        }

        if let Some(sender) = ctx.sender.as_deref() {
            let own = [me.as_deref(), me_lid.as_deref()];
            if own.contains(&Some(sender)) {
                ctx.from_me = true;
            }
        }

        ctx.timestamp = timestamp_of(&event).unwrap_or_else(now_millis);
        ctx.event = event;

        ctx.parse_command(handler);
        ctx.resolve_names(handler);

        ctx
    }

    fn empty(
        event_name: EventName,
        event_type: Option<EventType>,
        me: Option<String>,
        handler: Handler,
    ) -> Self {
        Self {
            event_name,
            event_type,
            event: Value::Null,
            timestamp: 0,
            me,
            chat: None,
            chat_name: None,
            sender: None,
            sender_name: None,
            push_name: None,
            id: None,
            from_me: false,
            content_type: None,
            text: None,
            message: None,
            content: None,
            context_info: None,
            quoted_message: None,
            quoted_type: None,
            quoted_text: None,
            stanza_id: None,
            participant: None,
            mentioned_jid: Vec::new(),
            expiration: None,
            pattern: None,
            args: None,
            is_cmd: false,
            is_group: false,
            is_status: false,
            is_admin: false,
            action: None,
            participants: Vec::new(),
            presence: None,
            call_status: None,
            duplicate: false,
            handler,
        }
    }

    fn fill_message(&mut self, event: &Value) {
        let key = event.get("key").unwrap_or(&Value::Null);
        self.chat = str_field(key, "remoteJid");
        self.id = str_field(key, "id");
        self.push_name = str_field(event, "pushName");
        self.sender = self.sender_from_key(key);
        self.from_me = key.get("fromMe").and_then(Value::as_bool).unwrap_or(false);

        let message = event
            .get("message")
            .or_else(|| event.get("update").and_then(|u| u.get("message")));
        if let Some(message) = message {
            self.fill_content(message);
        }
    }

    fn fill_content(&mut self, message: &Value) {
        let Some(extracted) = extract(message) else {
            return;
        };

        self.expiration = ephemeral_setting(&extracted);

        if let Some(info) = &extracted.context_info {
            if self.expiration.is_none() {
                self.expiration = info
                    .get("expiration")
                    .and_then(Value::as_u64)
                    .and_then(|secs| u32::try_from(secs).ok());
            }
            self.stanza_id = str_field(info, "stanzaId");
            self.participant = str_field(info, "participant");
            self.mentioned_jid = string_list(info.get("mentionedJid"));

            if let Some(quoted) = info.get("quotedMessage").filter(|q| q.is_object()) {
                if let Some(inner) = extract(quoted) {
                    self.quoted_type = Some(inner.kind);
                    self.quoted_text = inner.text;
                }
                self.quoted_message = Some(quoted.clone());
            }
        }

        self.content_type = Some(extracted.kind);
        self.text = extracted.text;
        self.content = Some(extracted.content);
        self.context_info = extracted.context_info;
        self.message = Some(extracted.message);
    }

    fn fill_reaction(&mut self, event: &Value) {
        let key = event.get("key").unwrap_or(&Value::Null);
        let reaction = event.get("reaction").unwrap_or(&Value::Null);
        let reactor = reaction.get("key").filter(|k| k.is_object()).unwrap_or(key);

        self.chat = str_field(key, "remoteJid");
        self.id = str_field(reactor, "id").or_else(|| str_field(key, "id"));
        self.from_me = reactor.get("fromMe").and_then(Value::as_bool).unwrap_or(false);
        self.sender = self.sender_from_key(reactor);
        self.content_type = Some(ContentKind::Reaction);
        self.text = str_field(reaction, "text");
        self.content = Some(reaction.clone());
    }

    fn fill_group(&mut self, event: &Value) {
        self.chat = str_field(event, "id");
        self.chat_name = str_field(event, "subject");
        self.sender = str_field(event, "author").map(|a| jid::normalize(&a));
    }

    fn fill_participants(&mut self, event: &Value) {
        self.chat = str_field(event, "id");
        self.sender = str_field(event, "author").map(|a| jid::normalize(&a));
        self.action = str_field(event, "action");
        self.participants = event
            .get("participants")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|p| match p {
                        Value::String(s) => Some(s.clone()),
                        other => str_field(other, "id").or_else(|| str_field(other, "phoneNumber")),
                    })
                    .map(|p| jid::normalize(&p))
                    .collect()
            })
            .unwrap_or_default();
    }

    fn fill_contact(&mut self, event: &Value) {
        let id = str_field(event, "id").map(|id| jid::normalize(&id));
        self.chat = id.clone();
        self.sender = id;
        self.sender_name = str_field(event, "notify")
            .or_else(|| str_field(event, "name"))
            .or_else(|| str_field(event, "verifiedName"));
    }

    fn fill_presence(&mut self, event: &Value) {
        self.chat = str_field(event, "id");
        if let Some((who, state)) = event
            .get("presences")
            .and_then(Value::as_object)
            .and_then(|p| p.iter().next())
        {
            self.sender = Some(jid::normalize(who));
            self.presence = str_field(state, "lastKnownPresence");
        }
    }

    fn fill_call(&mut self, event: &Value) {
        self.chat = str_field(event, "chatId").or_else(|| str_field(event, "from"));
        self.sender = str_field(event, "from").map(|f| jid::normalize(&f));
        self.id = str_field(event, "id");
        self.call_status = str_field(event, "status");
    }

    /// The author of a message key.
    ///
    /// Group and status messages name the author in `participant`;
    /// self-authored messages are ours; otherwise the chat is the author.
    fn sender_from_key(&self, key: &Value) -> Option<String> {
        let chat = str_field(key, "remoteJid")?;
        if key.get("fromMe").and_then(Value::as_bool).unwrap_or(false)
            && let Some(me) = &self.me
        {
            return Some(me.clone());
        }
        if jid::is_group(&chat) || jid::is_status(&chat) {
            return str_field(key, "participant").map(|p| jid::normalize(&p));
        }
        Some(jid::normalize(&chat))
    }

    fn parse_command(&mut self, handler: &Handler) {
        let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) else {
            return;
        };

        let (pattern, rest) = match text.split_once(char::is_whitespace) {
            Some((pattern, rest)) => (pattern, Some(rest.trim())),
            None => (text, None),
        };
        if pattern.is_empty() {
            return;
        }

        self.is_cmd = handler.is_command(pattern);
        self.args = rest.filter(|r| !r.is_empty()).map(str::to_string);
        self.pattern = Some(pattern.to_string());
    }

    fn resolve_names(&mut self, handler: &Handler) {
        if self.is_group
            && let Some(chat) = self.chat.as_deref()
            && let Some(meta) = handler.groups().get(chat)
        {
            if let Some(sender) = self.sender.as_deref() {
                self.is_admin = handler.permissions().is_admin(Some(&meta), sender);
            }
            if self.chat_name.is_none() && !meta.subject.is_empty() {
                self.chat_name = Some(meta.subject);
            }
        }

        if self.sender_name.is_none()
            && let Some(sender) = self.sender.as_deref()
        {
            self.sender_name = handler
                .contacts()
                .name(sender)
                .or_else(|| self.push_name.clone());
        }

        if self.chat_name.is_none() && !self.is_group {
            self.chat_name = self.sender_name.clone();
        }
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Send a text reply quoting this event.
    pub async fn reply(&self, text: impl Into<String>) -> Result<String, SendError> {
        let chat = self.chat.as_deref().ok_or(SendError::NoChat)?;
        let options = if self.event_name == EventName::MessagesUpsert {
            SendOptions::quoted(self.event.clone())
        } else {
            SendOptions::default()
        };
        self.handler
            .sender()
            .send_message(chat, serde_json::json!({ "text": text.into() }), options)
            .await
    }

    /// React to this event's message.
    pub async fn react(&self, emoji: &str) -> Result<String, SendError> {
        let chat = self.chat.as_deref().ok_or(SendError::NoChat)?;
        let key = self.event.get("key").cloned().unwrap_or(Value::Null);
        self.handler
            .sender()
            .send_message(
                chat,
                serde_json::json!({ "react": { "text": emoji, "key": key } }),
                SendOptions::default(),
            )
            .await
    }

    pub async fn send_message(
        &self,
        chat: &str,
        content: Value,
        options: SendOptions,
    ) -> Result<String, SendError> {
        self.handler.sender().send_message(chat, content, options).await
    }

    pub async fn relay_message(
        &self,
        chat: &str,
        content: Value,
        options: RelayOptions,
    ) -> Result<String, SendError> {
        self.handler.sender().relay_message(chat, content, options).await
    }
}

impl fmt::Debug for Ctx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ctx")
            .field("event_name", &self.event_name)
            .field("event_type", &self.event_type)
            .field("timestamp", &self.timestamp)
            .field("chat", &self.chat)
            .field("sender", &self.sender)
            .field("id", &self.id)
            .field("from_me", &self.from_me)
            .field("content_type", &self.content_type)
            .field("text", &self.text)
            .field("pattern", &self.pattern)
            .field("is_cmd", &self.is_cmd)
            .field("duplicate", &self.duplicate)
            .finish_non_exhaustive()
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A protobuf long as JSON: number, numeric string or `{low, high}`.
fn long_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        Value::Object(o) => {
            let low = o.get("low")?.as_i64()? & 0xFFFF_FFFF;
            let high = o.get("high").and_then(Value::as_i64).unwrap_or(0);
            Some((high << 32) | low)
        }
        _ => None,
    }
}

fn timestamp_of(event: &Value) -> Option<i64> {
    if let Some(secs) = event.get("messageTimestamp").and_then(long_of) {
        // Out of range timestamps fall back to the receive time.
        return secs.checked_mul(1000);
    }
    if let Some(ms) = event
        .get("reaction")
        .and_then(|r| r.get("senderTimestampMs"))
        .and_then(long_of)
    {
        return Some(ms);
    }
    match event.get("date")? {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|d| d.timestamp_millis()),
        other => long_of(other),
    }
}
