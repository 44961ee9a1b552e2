//! In-process store.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

use super::{Store, StoreResult};

/// Store kept entirely in memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        if key.is_empty() {
            return Ok(());
        }
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        self.data.write().clear();
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }
}
