//! Event feed endpoint.
//!
//! The bridge POSTs client events to `/events` as `{"event", "data"}`
//! envelopes, either one at a time or as a JSON array. Each envelope is
//! turned into an [`EventBatch`] and queued for the dispatch lane.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{EventBatch, FeedEnvelope};

/// Header carrying the shared feed secret.
pub const SECRET_HEADER: &str = "x-feed-secret";

#[derive(Clone)]
pub struct FeedState {
    tx: mpsc::Sender<EventBatch>,
    secret: Option<Arc<str>>,
}

impl FeedState {
    pub fn new(tx: mpsc::Sender<EventBatch>, secret: Option<String>) -> Self {
        Self {
            tx,
            secret: secret.map(Arc::from),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedBody {
    Many(Vec<FeedEnvelope>),
    One(FeedEnvelope),
}

/// Build the feed router.
pub fn router(state: FeedState) -> Router {
    Router::new()
        .route("/events", post(events_handler))
        .with_state(state)
}

async fn events_handler(
    State(state): State<FeedState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(secret) = &state.secret {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(secret.as_ref()) {
            warn!("Rejected feed request with a bad secret");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let envelopes = match serde_json::from_slice::<FeedBody>(&body) {
        Ok(FeedBody::Many(list)) => list,
        Ok(FeedBody::One(envelope)) => vec![envelope],
        Err(e) => {
            warn!("Malformed feed body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    for envelope in envelopes {
        let batch = match EventBatch::try_from(envelope) {
            Ok(batch) => batch,
            Err(e) => {
                debug!("Skipping feed event: {}", e);
                continue;
            }
        };
        if state.tx.send(batch).await.is_err() {
            warn!("Dispatch lane is gone, refusing feed events");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
    }

    StatusCode::ACCEPTED
}

/// Serve the feed on `addr` until ctrl-c.
pub async fn serve(addr: SocketAddr, router: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("📡 Event feed listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Event feed stopped");
    Ok(())
}
