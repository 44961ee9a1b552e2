//! Key/value store module.
//!
//! Every persistent piece of runtime state (group metadata, contacts,
//! ephemeral timers, settings) sits behind the [`Store`] trait so the
//! backend can be swapped without touching the dispatcher.
//!
//! ## Backends
//!
//! - `JsonStore` - a single JSON file, optional write-through and reload on external change
//! - `SqliteStore` - one `data` table in a SQLite database
//! - `MongoStore` - one collection, mirrored in memory with background writes
//! - `MemoryStore` - process-local map (tests, throwaway runs)
//!
//! ## Usage
//!
//! ```rust
//! let store = JsonStore::open(JsonStoreOptions::new("data/settings.json").auto_save(true))?;
//! store.set_as("prefix", &vec!["!".to_string()])?;
//! let prefix: Option<Vec<String>> = store.get_as("prefix")?;
//! ```

mod contacts;
mod groups;
mod json;
mod memory;
mod models;
mod mongo;
mod sqlite;
mod timers;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use contacts::ContactRepo;
pub use groups::GroupRepo;
pub use json::{JsonStore, JsonStoreOptions};
pub use memory::MemoryStore;
pub use models::{Contact, GroupMetadata, Participant};
pub use mongo::MongoStore;
pub use sqlite::SqliteStore;
pub use timers::TimerRepo;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store requires a save name")]
    MissingSaveName,

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("bson error: {0}")]
    Bson(String),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify_debouncer_full::notify::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Synchronous key/value mapping of JSON values.
///
/// Empty keys are ignored by `set` and never found by `get`.
pub trait Store: Send + Sync {
    /// Name of the store (file path, table, collection).
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    fn has(&self, key: &str) -> StoreResult<bool>;

    fn delete(&self, key: &str) -> StoreResult<()>;

    fn clear(&self) -> StoreResult<()>;

    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Persist pending changes. No-op for write-through backends.
    fn save(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Typed helpers on top of any [`Store`].
pub trait StoreExt {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>>;

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()>;
}

impl<S: Store + ?Sized> StoreExt for S {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        self.set(key, serde_json::to_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_ext_round_trips_typed_values() {
        let store = MemoryStore::new("settings");
        store.set_as("prefix", &vec!["!".to_string(), ".".to_string()]).unwrap();

        let prefix: Option<Vec<String>> = store.get_as("prefix").unwrap();
        assert_eq!(prefix, Some(vec!["!".to_string(), ".".to_string()]));

        let missing: Option<u32> = store.get_as("timer").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_store_ext_reports_shape_mismatch() {
        let store = MemoryStore::new("settings");
        store.set("prefix", Value::String("!".into())).unwrap();

        let result: StoreResult<Option<Vec<String>>> = store.get_as("prefix");
        assert!(matches!(result, Err(StoreError::Json(_))));
    }
}
