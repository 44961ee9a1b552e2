//! Socket module - the narrow interface to the WhatsApp client.
//!
//! The runtime never speaks the wire protocol itself. It only needs to send
//! and relay messages, fetch group metadata and know which account it is
//! running as; everything else belongs to the external client.

mod bridge;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::store::GroupMetadata;

pub use bridge::BridgeSocket;

/// Errors raised by a socket implementation.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("client returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("socket not connected")]
    Disconnected,
}

/// The account the client is logged in as.
///
/// WhatsApp exposes the same account under a phone-number jid and a
/// linked-device lid; both are kept so self-authored events can be
/// recognised in either namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BotIdentity {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub lid: Option<String>,

    #[serde(default)]
    pub name: Option<String>,
}

/// Options for `sendMessage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Raw message to quote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quoted: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral_expiration: Option<u32>,

    /// Options passed through to the client untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SendOptions {
    /// Quote the given raw message.
    pub fn quoted(message: Value) -> Self {
        Self {
            quoted: Some(message),
            ..Default::default()
        }
    }
}

/// Options for `relayMessage`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The external WhatsApp client, as seen by the runtime.
#[async_trait]
pub trait Socket: Send + Sync {
    /// The identity the client is logged in as.
    fn identity(&self) -> BotIdentity;

    /// Build and send a message from high-level content. Returns the sent message.
    async fn send_message(
        &self,
        jid: &str,
        content: Value,
        options: SendOptions,
    ) -> Result<Value, SocketError>;

    /// Relay an already-built message proto. Returns the message id.
    async fn relay_message(
        &self,
        jid: &str,
        content: Value,
        options: RelayOptions,
    ) -> Result<String, SocketError>;

    /// Fetch fresh metadata for a group.
    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata, SocketError>;
}
