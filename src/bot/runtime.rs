//! Bot runtime - the single dispatch lane.

use tokio::sync::mpsc;
use tracing::info;

use super::Handler;
use crate::events::EventBatch;

/// Consume event batches one at a time until the feed closes or the
/// process is interrupted.
///
/// Batches are handled strictly in arrival order; a batch is fully
/// dispatched before the next one is taken off the channel.
pub async fn run(handler: Handler, mut batches: mpsc::Receiver<EventBatch>) {
    info!("Dispatch lane started");

    loop {
        tokio::select! {
            batch = batches.recv() => match batch {
                Some(batch) => handler.handle(batch).await,
                None => {
                    info!("Event feed closed, stopping dispatch lane");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping dispatch lane");
                break;
            }
        }
    }
}
