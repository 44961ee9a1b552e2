//! MongoDB store.
//!
//! The whole collection is mirrored in memory on connect so reads stay
//! synchronous; writes update the mirror and are queued to a single writer
//! task that applies them to MongoDB in order.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::options::{ClientOptions, ReplaceOptions};
use mongodb::{Client, Collection};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Store, StoreError, StoreResult};

/// A pending write against the backing collection.
#[derive(Debug, Clone, PartialEq)]
enum WriteOp {
    Upsert { key: String, value: Bson },
    Delete(String),
    Clear,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upsert { key, .. } => write!(f, "upsert {}", key),
            Self::Delete(key) => write!(f, "delete {}", key),
            Self::Clear => f.write_str("clear"),
        }
    }
}

/// Spawn the task that applies queued writes one at a time.
fn spawn_writer<F, Fut, E>(name: String, apply: F) -> (mpsc::UnboundedSender<WriteOp>, JoinHandle<()>)
where
    F: Fn(WriteOp) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
    let task = tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            let label = op.to_string();
            if let Err(e) = apply(op).await {
                warn!("Failed to {} in {}: {}", label, name, e);
            }
        }
        debug!("Writer for {} stopped", name);
    });
    (tx, task)
}

async fn apply_write(collection: Collection<Document>, op: WriteOp) -> mongodb::error::Result<()> {
    match op {
        WriteOp::Upsert { key, value } => {
            let options = ReplaceOptions::builder().upsert(true).build();
            collection
                .replace_one(doc! { "_id": key.as_str() }, doc! { "_id": key.as_str(), "value": value })
                .with_options(options)
                .await?;
        }
        WriteOp::Delete(key) => {
            collection.delete_one(doc! { "_id": key.as_str() }).await?;
        }
        WriteOp::Clear => {
            collection.delete_many(doc! {}).await?;
        }
    }
    Ok(())
}

/// Store backed by a MongoDB collection of `{ _id: key, value }` documents.
#[derive(Clone)]
pub struct MongoStore {
    name: String,
    mirror: Arc<DashMap<String, Value>>,
    writer: mpsc::UnboundedSender<WriteOp>,
}

impl MongoStore {
    /// Connect to MongoDB and load `collection` into memory.
    ///
    /// # Errors
    /// Returns error if connection, ping or the initial load fails.
    pub async fn connect(uri: &str, db_name: &str, collection: &str) -> StoreResult<Self> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Connected to MongoDB collection {}.{}", db_name, collection);

        let collection: Collection<Document> = client.database(db_name).collection(collection);
        let mirror = Arc::new(DashMap::new());

        let mut cursor = collection.find(doc! {}).await?;
        while let Some(result) = cursor.next().await {
            let document = result?;
            let Ok(key) = document.get_str("_id") else {
                continue;
            };
            let value = match document.get("value") {
                Some(raw) => bson::from_bson::<Value>(raw.clone())
                    .map_err(|e| StoreError::Bson(e.to_string()))?,
                None => Value::Null,
            };
            mirror.insert(key.to_string(), value);
        }

        let name = collection.name().to_string();
        let (writer, _task) = spawn_writer(name.clone(), move |op| apply_write(collection.clone(), op));

        Ok(Self { name, mirror, writer })
    }

    fn queue(&self, op: WriteOp) {
        if let Err(e) = self.writer.send(op) {
            warn!("Writer for {} is gone, dropped {}", self.name, e.0);
        }
    }
}

impl Store for MongoStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.mirror.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        if key.is_empty() {
            return Ok(());
        }
        let encoded: Bson = bson::to_bson(&value).map_err(|e| StoreError::Bson(e.to_string()))?;
        self.mirror.insert(key.to_string(), value);

        self.queue(WriteOp::Upsert {
            key: key.to_string(),
            value: encoded,
        });
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.mirror.contains_key(key))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.mirror.remove(key);

        self.queue(WriteOp::Delete(key.to_string()));
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.mirror.clear();

        self.queue(WriteOp::Clear);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.mirror.iter().map(|e| e.key().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::convert::Infallible;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_writes_apply_in_queue_order() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();
        let (tx, task) = spawn_writer("timer".to_string(), move |op: WriteOp| {
            let sink = sink.clone();
            async move {
                // Earlier writes take longer, so any reordering would show.
                let delay = match &op {
                    WriteOp::Clear => 30,
                    WriteOp::Upsert { value, .. } if *value == Bson::String("A".into()) => 20,
                    _ => 0,
                };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                sink.lock().push(op);
                Ok::<(), Infallible>(())
            }
        });

        let ops = vec![
            WriteOp::Clear,
            WriteOp::Upsert {
                key: "chat".into(),
                value: Bson::String("A".into()),
            },
            WriteOp::Upsert {
                key: "chat".into(),
                value: Bson::String("B".into()),
            },
            WriteOp::Delete("other".into()),
        ];
        for op in ops.clone() {
            tx.send(op).unwrap();
        }
        drop(tx);
        task.await.unwrap();

        assert_eq!(*applied.lock(), ops);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_the_writer() {
        let applied = Arc::new(Mutex::new(Vec::new()));
        let sink = applied.clone();
        let (tx, task) = spawn_writer("settings".to_string(), move |op: WriteOp| {
            let sink = sink.clone();
            async move {
                if op == WriteOp::Clear {
                    return Err("connection reset");
                }
                sink.lock().push(op);
                Ok(())
            }
        });

        tx.send(WriteOp::Clear).unwrap();
        tx.send(WriteOp::Delete("prefix".into())).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(*applied.lock(), vec![WriteOp::Delete("prefix".into())]);
    }
}
