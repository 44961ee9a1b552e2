//! JSON file store.
//!
//! Keeps the whole map in memory and writes it back as pretty-printed JSON.
//! With `auto_load`, a debounced file watcher reloads the map when the file
//! is changed by someone else; the store's own writes are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::{Store, StoreError, StoreResult};

/// Options for opening a [`JsonStore`].
#[derive(Debug, Clone)]
pub struct JsonStoreOptions {
    pub save_name: PathBuf,
    pub auto_save: bool,
    pub auto_load: bool,
}

impl JsonStoreOptions {
    pub fn new(save_name: impl Into<PathBuf>) -> Self {
        Self {
            save_name: save_name.into(),
            auto_save: false,
            auto_load: false,
        }
    }

    /// Write the file after every mutation.
    #[must_use]
    pub fn auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    /// Reload when the file changes on disk.
    #[must_use]
    pub fn auto_load(mut self, enabled: bool) -> Self {
        self.auto_load = enabled;
        self
    }
}

struct JsonInner {
    path: PathBuf,
    name: String,
    data: RwLock<Map<String, Value>>,
    auto_save: bool,
    /// Set after our own write so the watcher skips the echo.
    self_write: AtomicBool,
}

impl JsonInner {
    fn load(&self) {
        let loaded = match std::fs::read_to_string(&self.path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Invalid JSON in {}: {}", self.name, e);
                    Map::new()
                }
            },
            Err(e) => {
                debug!("Starting {} empty: {}", self.name, e);
                Map::new()
            }
        };
        *self.data.write() = loaded;
    }

    fn write(&self) -> StoreResult<()> {
        let text = serde_json::to_string_pretty(&*self.data.read())?;
        self.self_write.store(true, Ordering::SeqCst);
        if let Err(e) = std::fs::write(&self.path, text) {
            self.self_write.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    fn save_check(&self) -> StoreResult<()> {
        if self.auto_save {
            self.write()?;
        }
        Ok(())
    }
}

/// Store backed by a single JSON file.
pub struct JsonStore {
    inner: Arc<JsonInner>,
    _watcher: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
}

impl JsonStore {
    /// Open (or create on first save) the store at `options.save_name`.
    ///
    /// # Errors
    /// Fails when the save name is empty or the watcher cannot be started.
    pub fn open(options: JsonStoreOptions) -> StoreResult<Self> {
        if options.save_name.as_os_str().is_empty() {
            return Err(StoreError::MissingSaveName);
        }

        let inner = Arc::new(JsonInner {
            name: options.save_name.display().to_string(),
            path: options.save_name,
            data: RwLock::new(Map::new()),
            auto_save: options.auto_save,
            self_write: AtomicBool::new(false),
        });
        inner.load();

        let watcher = if options.auto_load {
            Some(Self::watch(inner.clone())?)
        } else {
            None
        };

        Ok(Self {
            inner,
            _watcher: watcher,
        })
    }

    fn watch(inner: Arc<JsonInner>) -> StoreResult<Debouncer<RecommendedWatcher, RecommendedCache>> {
        let target = inner.path.clone();
        let handler_inner = inner.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let touched = events.iter().any(|event| {
                        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                            && event.paths.iter().any(|p| same_file(p, &target))
                    });
                    if !touched {
                        return;
                    }
                    if handler_inner.self_write.swap(false, Ordering::SeqCst) {
                        return;
                    }
                    debug!("Reload {}", handler_inner.name);
                    handler_inner.load();
                }
                Err(errors) => {
                    for e in errors {
                        error!("Store watcher error: {}", e);
                    }
                }
            },
        )?;

        let dir = match inner.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        debouncer.watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(debouncer)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    a.file_name() == b.file_name()
}

impl Store for JsonStore {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.inner.data.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        if key.is_empty() {
            return Ok(());
        }
        self.inner.data.write().insert(key.to_string(), value);
        self.inner.save_check()
    }

    fn has(&self, key: &str) -> StoreResult<bool> {
        Ok(self.inner.data.read().contains_key(key))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.data.write().remove(key);
        self.inner.save_check()
    }

    fn clear(&self) -> StoreResult<()> {
        self.inner.data.write().clear();
        self.inner.save_check()
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.data.read().keys().cloned().collect())
    }

    fn save(&self) -> StoreResult<()> {
        self.inner.write()
    }
}
