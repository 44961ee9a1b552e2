//! Per-chat ephemeral timer repository.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use super::{Store, StoreExt};

/// Disappearing-message duration per chat, in seconds. Zero means off.
pub struct TimerRepo {
    store: Arc<dyn Store>,
    timers: DashMap<String, u32>,
}

impl TimerRepo {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            timers: DashMap::new(),
        }
    }

    pub fn get(&self, chat: &str) -> Option<u32> {
        if let Some(secs) = self.timers.get(chat) {
            return Some(*secs);
        }

        match self.store.get_as::<u32>(chat) {
            Ok(Some(secs)) => {
                self.timers.insert(chat.to_string(), secs);
                Some(secs)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read timer for {}: {}", chat, e);
                None
            }
        }
    }

    pub fn set(&self, chat: &str, secs: u32) {
        if chat.is_empty() {
            return;
        }
        if self.get(chat) == Some(secs) {
            return;
        }

        debug!("Timer for {} set to {}s", chat, secs);
        if let Err(e) = self.store.set_as(chat, &secs) {
            warn!("Failed to persist timer for {}: {}", chat, e);
        }
        self.timers.insert(chat.to_string(), secs);
    }
}
