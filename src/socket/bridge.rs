//! HTTP bridge to an external WhatsApp client process.
//!
//! The client runs as a sidecar exposing a small JSON API; this socket
//! forwards the runtime's calls to it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, info};
use url::Url;

use super::{BotIdentity, RelayOptions, SendOptions, Socket, SocketError};
use crate::store::GroupMetadata;

/// Socket implementation talking to the bridge over HTTP.
pub struct BridgeSocket {
    client: Client,
    base: Url,
    token: Option<String>,
    identity: RwLock<BotIdentity>,
    /// Set once `connect` has read the bridge identity.
    connected: AtomicBool,
}

impl BridgeSocket {
    /// Create a socket for the bridge at `base`.
    pub fn new(base: Url, token: Option<String>) -> Result<Self, SocketError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base,
            token,
            identity: RwLock::new(BotIdentity::default()),
            connected: AtomicBool::new(false),
        })
    }

    /// Ask the bridge which account it is logged in as.
    ///
    /// `overrides` fields that are set win over what the bridge reports.
    pub async fn connect(&self, overrides: &BotIdentity) -> Result<BotIdentity, SocketError> {
        let mut identity: BotIdentity = self.get("me").await?;
        if overrides.id.is_some() {
            identity.id = overrides.id.clone();
        }
        if overrides.lid.is_some() {
            identity.lid = overrides.lid.clone();
        }

        info!(
            "Bridge identity: id={:?} lid={:?}",
            identity.id, identity.lid
        );
        *self.identity.write() = identity.clone();
        self.connected.store(true, Ordering::Release);
        Ok(identity)
    }

    fn endpoint(&self, path: &str) -> Result<Url, SocketError> {
        self.base
            .join(path)
            .map_err(|e| SocketError::Decode(format!("bad endpoint {}: {}", path, e)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SocketError> {
        let url = self.endpoint(path)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        Self::decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SocketError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SocketError::Disconnected);
        }
        let url = self.endpoint(path)?;
        debug!("Bridge POST {}", url);
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SocketError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SocketError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let value: Value = response.json().await?;
        serde_json::from_value(value).map_err(|e| SocketError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Socket for BridgeSocket {
    fn identity(&self) -> BotIdentity {
        self.identity.read().clone()
    }

    async fn send_message(
        &self,
        jid: &str,
        content: Value,
        options: SendOptions,
    ) -> Result<Value, SocketError> {
        self.post(
            "send-message",
            &json!({ "jid": jid, "content": content, "options": options }),
        )
        .await
    }

    async fn relay_message(
        &self,
        jid: &str,
        content: Value,
        options: RelayOptions,
    ) -> Result<String, SocketError> {
        let response: Value = self
            .post(
                "relay-message",
                &json!({ "jid": jid, "content": content, "options": options }),
            )
            .await?;

        match response.get("messageId").and_then(Value::as_str) {
            Some(id) => Ok(id.to_string()),
            None => Err(SocketError::Decode("relay response without messageId".into())),
        }
    }

    async fn group_metadata(&self, jid: &str) -> Result<GroupMetadata, SocketError> {
        self.post("group-metadata", &json!({ "jid": jid })).await
    }
}
