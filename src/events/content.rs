//! Message content extraction.
//!
//! A raw message is an object keyed by content kind (`conversation`,
//! `imageMessage`, ...). Extraction picks one entry deterministically:
//!
//! - wrapper kinds (`ephemeralMessage`, `viewOnceMessage*`,
//!   `documentWithCaptionMessage`) are unwrapped first
//! - a `protocolMessage` carrying an `editedMessage` is replaced by the edit
//! - the first primary kind in key order wins; housekeeping kinds
//!   (key distribution, plain protocol messages) are only used when nothing
//!   else is present

use std::fmt;

use serde_json::Value;

const WRAPPERS: &[&str] = &[
    "ephemeralMessage",
    "viewOnceMessage",
    "viewOnceMessageV2",
    "viewOnceMessageV2Extension",
    "documentWithCaptionMessage",
];

/// Known message content kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Conversation,
    ExtendedText,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Contact,
    ContactsArray,
    Location,
    LiveLocation,
    Reaction,
    PollCreation,
    ListResponse,
    ButtonsResponse,
    TemplateButtonReply,
    Protocol,
    SenderKeyDistribution,
    /// Any kind not modelled above, by its raw key.
    Other(String),
}

impl ContentKind {
    pub fn from_key(key: &str) -> Self {
        match key {
            "conversation" => Self::Conversation,
            "extendedTextMessage" => Self::ExtendedText,
            "imageMessage" => Self::Image,
            "videoMessage" => Self::Video,
            "audioMessage" => Self::Audio,
            "documentMessage" => Self::Document,
            "stickerMessage" => Self::Sticker,
            "contactMessage" => Self::Contact,
            "contactsArrayMessage" => Self::ContactsArray,
            "locationMessage" => Self::Location,
            "liveLocationMessage" => Self::LiveLocation,
            "reactionMessage" => Self::Reaction,
            "pollCreationMessage" => Self::PollCreation,
            "listResponseMessage" => Self::ListResponse,
            "buttonsResponseMessage" => Self::ButtonsResponse,
            "templateButtonReplyMessage" => Self::TemplateButtonReply,
            "protocolMessage" => Self::Protocol,
            "senderKeyDistributionMessage" => Self::SenderKeyDistribution,
            other => Self::Other(other.to_string()),
        }
    }

    /// The raw key this kind is stored under.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Conversation => "conversation",
            Self::ExtendedText => "extendedTextMessage",
            Self::Image => "imageMessage",
            Self::Video => "videoMessage",
            Self::Audio => "audioMessage",
            Self::Document => "documentMessage",
            Self::Sticker => "stickerMessage",
            Self::Contact => "contactMessage",
            Self::ContactsArray => "contactsArrayMessage",
            Self::Location => "locationMessage",
            Self::LiveLocation => "liveLocationMessage",
            Self::Reaction => "reactionMessage",
            Self::PollCreation => "pollCreationMessage",
            Self::ListResponse => "listResponseMessage",
            Self::ButtonsResponse => "buttonsResponseMessage",
            Self::TemplateButtonReply => "templateButtonReplyMessage",
            Self::Protocol => "protocolMessage",
            Self::SenderKeyDistribution => "senderKeyDistributionMessage",
            Self::Other(key) => key,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The content picked out of a raw message.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub kind: ContentKind,
    pub text: Option<String>,
    /// The payload stored under the kind's key.
    pub content: Value,
    pub context_info: Option<Value>,
    /// The message object the content was found in, after unwrapping.
    pub message: Value,
}

impl Extracted {
    fn from_entry(key: &str, value: &Value, message: &Value) -> Self {
        let kind = ContentKind::from_key(key);
        let text = match (&kind, value) {
            (_, Value::String(s)) => Some(s.clone()),
            (ContentKind::ListResponse, v) => string_at(v, &["singleSelectReply", "selectedRowId"])
                .or_else(|| string_at(v, &["title"])),
            (ContentKind::ButtonsResponse, v) => string_at(v, &["selectedButtonId"]),
            (_, v) => ["caption", "text", "selectedId"]
                .iter()
                .find_map(|field| string_at(v, &[field])),
        };

        let context_info = value
            .get("contextInfo")
            .filter(|ci| ci.is_object())
            .cloned();

        Self {
            kind,
            text,
            content: value.clone(),
            context_info,
            message: message.clone(),
        }
    }

    fn is_housekeeping(&self) -> bool {
        matches!(
            self.kind,
            ContentKind::SenderKeyDistribution | ContentKind::Protocol
        )
    }
}

fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    cursor.as_str().map(str::to_string)
}

/// Extract the content of a raw message object.
///
/// Returns `None` when the value is not an object or holds no usable entry.
pub fn extract(message: &Value) -> Option<Extracted> {
    let map = message.as_object()?;

    for wrapper in WRAPPERS {
        if let Some(inner) = map.get(*wrapper).and_then(|w| w.get("message"))
            && inner.is_object()
        {
            return extract(inner);
        }
    }

    if let Some(edited) = map
        .get("protocolMessage")
        .and_then(|p| p.get("editedMessage"))
        && edited.is_object()
    {
        return extract(edited);
    }

    let mut fallback = None;
    for (key, value) in map {
        if value.is_null() || key == "messageContextInfo" {
            continue;
        }
        if !value.is_object() && !value.is_string() {
            continue;
        }

        let extracted = Extracted::from_entry(key, value, message);
        if extracted.is_housekeeping() {
            fallback.get_or_insert(extracted);
            continue;
        }
        return Some(extracted);
    }

    fallback
}

/// Whether a protocol message changes the chat's disappearing-message
/// setting, and to what.
pub fn ephemeral_setting(extracted: &Extracted) -> Option<u32> {
    if extracted.kind != ContentKind::Protocol {
        return None;
    }
    let ty = extracted.content.get("type")?;
    let is_setting = ty.as_str() == Some("EPHEMERAL_SETTING") || ty.as_u64() == Some(3);
    if !is_setting {
        return None;
    }
    match extracted.content.get("ephemeralExpiration").and_then(Value::as_u64) {
        None => Some(0),
        Some(secs) => u32::try_from(secs).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_is_text() {
        let got = extract(&json!({"conversation": "hello there"})).unwrap();
        assert_eq!(got.kind, ContentKind::Conversation);
        assert_eq!(got.text.as_deref(), Some("hello there"));
        assert_eq!(got.context_info, None);
    }

    #[test]
    fn test_caption_wins_over_text() {
        let got = extract(&json!({
            "imageMessage": {"caption": ".sticker", "text": "ignored", "contextInfo": {"expiration": 604800}}
        }))
        .unwrap();
        assert_eq!(got.kind, ContentKind::Image);
        assert_eq!(got.text.as_deref(), Some(".sticker"));
        assert_eq!(got.context_info, Some(json!({"expiration": 604800})));
    }

    #[test]
    fn test_primary_kind_beats_housekeeping() {
        let got = extract(&json!({
            "senderKeyDistributionMessage": {"groupId": "x"},
            "messageContextInfo": {},
            "conversation": ".ping"
        }))
        .unwrap();
        assert_eq!(got.kind, ContentKind::Conversation);

        let only = extract(&json!({"senderKeyDistributionMessage": {"groupId": "x"}})).unwrap();
        assert_eq!(only.kind, ContentKind::SenderKeyDistribution);
    }

    #[test]
    fn test_first_primary_kind_wins() {
        let got = extract(&json!({
            "extendedTextMessage": {"text": "first"},
            "imageMessage": {"caption": "second"}
        }))
        .unwrap();
        assert_eq!(got.text.as_deref(), Some("first"));
    }

    #[test]
    fn test_edit_replaces_original() {
        let got = extract(&json!({
            "protocolMessage": {
                "type": "MESSAGE_EDIT",
                "editedMessage": {"conversation": "fixed typo"}
            }
        }))
        .unwrap();
        assert_eq!(got.kind, ContentKind::Conversation);
        assert_eq!(got.text.as_deref(), Some("fixed typo"));
    }

    #[test]
    fn test_wrappers_are_unwrapped() {
        let got = extract(&json!({
            "ephemeralMessage": {"message": {
                "viewOnceMessageV2": {"message": {"imageMessage": {"caption": "secret", "viewOnce": true}}}
            }}
        }))
        .unwrap();
        assert_eq!(got.kind, ContentKind::Image);
        assert_eq!(got.text.as_deref(), Some("secret"));
        assert!(got.message.get("imageMessage").is_some());
    }

    #[test]
    fn test_responses() {
        let list = extract(&json!({
            "listResponseMessage": {"singleSelectReply": {"selectedRowId": ".menu"}}
        }))
        .unwrap();
        assert_eq!(list.text.as_deref(), Some(".menu"));

        let buttons = extract(&json!({"buttonsResponseMessage": {"selectedButtonId": ".ping"}})).unwrap();
        assert_eq!(buttons.text.as_deref(), Some(".ping"));
    }

    #[test]
    fn test_ephemeral_setting() {
        let got = extract(&json!({
            "protocolMessage": {"type": "EPHEMERAL_SETTING", "ephemeralExpiration": 86400}
        }))
        .unwrap();
        assert_eq!(ephemeral_setting(&got), Some(86400));

        let off = extract(&json!({"protocolMessage": {"type": 3}})).unwrap();
        assert_eq!(ephemeral_setting(&off), Some(0));

        let huge = extract(&json!({
            "protocolMessage": {"type": "EPHEMERAL_SETTING", "ephemeralExpiration": 4_294_967_296u64}
        }))
        .unwrap();
        assert_eq!(ephemeral_setting(&huge), None);
    }

    #[test]
    fn test_non_object_is_none() {
        assert!(extract(&json!(null)).is_none());
        assert!(extract(&json!({})).is_none());
        assert!(extract(&json!({"conversation": null})).is_none());
    }
}
