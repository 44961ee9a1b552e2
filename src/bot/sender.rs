//! Outbound send wrapper.
//!
//! Every send gets a message id (generated when the caller has none) and
//! the chat's cached disappearing-message timer before reaching the socket.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::error;

use crate::socket::{RelayOptions, SendOptions, Socket, SocketError};
use crate::store::TimerRepo;
use crate::utils::gen_hex;

/// Length of generated message ids.
pub const MESSAGE_ID_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to send to {chat}: {source}")]
    Socket {
        chat: String,
        #[source]
        source: SocketError,
    },

    #[error("event has no chat to reply to")]
    NoChat,
}

#[derive(Clone)]
pub struct Sender {
    socket: Arc<dyn Socket>,
    timers: Arc<TimerRepo>,
}

impl Sender {
    pub fn new(socket: Arc<dyn Socket>, timers: Arc<TimerRepo>) -> Self {
        Self { socket, timers }
    }

    fn active_timer(&self, chat: &str) -> Option<u32> {
        self.timers.get(chat).filter(|secs| *secs > 0)
    }

    /// Send high-level content. Returns the sent message id.
    pub async fn send_message(
        &self,
        chat: &str,
        content: Value,
        mut options: SendOptions,
    ) -> Result<String, SendError> {
        let id = options
            .message_id
            .get_or_insert_with(|| gen_hex(MESSAGE_ID_LEN))
            .clone();

        if options.ephemeral_expiration.is_none() {
            options.ephemeral_expiration = self.active_timer(chat);
        }

        match self.socket.send_message(chat, content, options).await {
            Ok(sent) => Ok(sent
                .pointer("/key/id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(id)),
            Err(source) => {
                error!("Failed to send message to {}: {}", chat, source);
                Err(SendError::Socket {
                    chat: chat.to_string(),
                    source,
                })
            }
        }
    }

    /// Relay a prebuilt message. Returns the relayed message id.
    pub async fn relay_message(
        &self,
        chat: &str,
        mut content: Value,
        mut options: RelayOptions,
    ) -> Result<String, SendError> {
        options
            .message_id
            .get_or_insert_with(|| gen_hex(MESSAGE_ID_LEN));

        if let Some(secs) = self.active_timer(chat) {
            inject_expiration(&mut content, secs);
        }

        self.socket
            .relay_message(chat, content, options)
            .await
            .map_err(|source| {
                error!("Failed to relay message to {}: {}", chat, source);
                SendError::Socket {
                    chat: chat.to_string(),
                    source,
                }
            })
    }
}

/// Write `contextInfo.expiration` into every top-level object in `content`.
///
/// Relay content can carry several payload variants side by side, and
/// each needs its own context info.
pub fn inject_expiration(content: &mut Value, secs: u32) {
    let Some(map) = content.as_object_mut() else {
        return;
    };
    for value in map.values_mut() {
        let Some(payload) = value.as_object_mut() else {
            continue;
        };
        let info = payload
            .entry("contextInfo")
            .or_insert_with(|| Value::Object(Map::new()));
        if !info.is_object() {
            *info = Value::Object(Map::new());
        }
        if let Some(info) = info.as_object_mut() {
            info.insert("expiration".to_string(), Value::from(secs));
        }
    }
}
