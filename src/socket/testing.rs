//! Recording socket used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::{BotIdentity, RelayOptions, SendOptions, Socket, SocketError};
use crate::store::GroupMetadata;

/// A call made through the socket.
#[derive(Debug, Clone)]
pub enum SocketCall {
    Send {
        jid: String,
        content: Value,
        options: SendOptions,
    },
    Relay {
        jid: String,
        content: Value,
        options: RelayOptions,
    },
}

/// Socket double that records sends and serves canned group metadata.
#[derive(Default)]
pub struct RecordingSocket {
    pub identity: BotIdentity,
    pub calls: Mutex<Vec<SocketCall>>,
    pub groups: Mutex<HashMap<String, GroupMetadata>>,
    pub metadata_fetches: AtomicUsize,
    pub fail_sends: AtomicBool,
}

impl RecordingSocket {
    pub fn new(id: &str, lid: &str) -> Self {
        Self {
            identity: BotIdentity {
                id: Some(id.to_string()),
                lid: Some(lid.to_string()),
                name: None,
            },
            ..Default::default()
        }
    }

    pub fn with_group(self, meta: GroupMetadata) -> Self {
        self.groups.lock().insert(meta.id.clone(), meta);
        self
    }

    pub fn calls(&self) -> Vec<SocketCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Socket for RecordingSocket {
    fn identity(&self) -> BotIdentity {
        self.identity.clone()
    }

    async fn send_message(
        &self,
        jid: &str,
        content: Value,
        options: SendOptions,
    ) -> Result<Value, SocketError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SocketError::Disconnected);
        }
        let id = options.message_id.clone();
        self.calls.lock().push(SocketCall::Send {
            jid: jid.to_string(),
            content,
            options,
        });
        Ok(json!({ "key": { "remoteJid": jid, "id": id, "fromMe": true } }))
    }

    async fn relay_message(
        &self,
        jid: &str,
        content: Value,
        options: RelayOptions,
    ) -> Result<String, SocketError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SocketError::Disconnected);
        }
        let id = options.message_id.clone().unwrap_or_default();
        self.calls.lock().push(SocketCall::Relay {
            jid: jid.to_string(),
            content,
            options,
        });
        Ok(id)
    }

    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata, SocketError> {
        self.metadata_fetches.fetch_add(1, Ordering::SeqCst);
        self.groups
            .lock()
            .get(jid)
            .cloned()
            .ok_or(SocketError::Status {
                status: 404,
                body: format!("unknown group {}", jid),
            })
    }
}
