//! Filesystem watcher for the plugin directory.
//!
//! Watches for manifest create/modify/delete events and sends them through a
//! channel; a reload task applies each event to the handler's registry.

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify_debouncer_full::notify::event::{ModifyKind, RenameMode};
use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::loader::{is_manifest, load_file};
use crate::bot::Handler;

/// Events emitted by the plugin watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}

impl PluginEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(p) | Self::Changed(p) | Self::Removed(p) => p,
        }
    }
}

/// Watches the plugin directory with debouncing.
pub struct PluginWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl PluginWatcher {
    /// Start watching `dir` recursively.
    ///
    /// The watcher must be kept alive (not dropped) for events to continue.
    pub fn start(dir: &Path) -> Result<(Self, mpsc::UnboundedReceiver<PluginEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut debouncer = new_debouncer(
            std::time::Duration::from_millis(500),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        for plugin_event in classify(&event.kind, &event.paths) {
                            debug!(path = %plugin_event.path().display(), "plugin watcher event");
                            let _ = tx.send(plugin_event);
                        }
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "plugin watcher error");
                    }
                }
            },
        )?;

        debouncer.watch(dir, RecursiveMode::Recursive)?;
        info!(dir = %dir.display(), "plugin watcher: watching directory");

        Ok((
            Self {
                _debouncer: debouncer,
            },
            rx,
        ))
    }
}

/// Map a filesystem event onto plugin events for manifest paths.
fn classify(kind: &EventKind, paths: &[PathBuf]) -> Vec<PluginEvent> {
    let manifests = || paths.iter().filter(|p| is_manifest(p)).cloned();

    match kind {
        EventKind::Create(_) => manifests().map(PluginEvent::Added).collect(),
        EventKind::Remove(_) => manifests().map(PluginEvent::Removed).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            manifests().map(PluginEvent::Removed).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            manifests().map(PluginEvent::Added).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut events = Vec::new();
            if let Some(from) = paths.first().filter(|p| is_manifest(p)) {
                events.push(PluginEvent::Removed(from.clone()));
            }
            if let Some(to) = paths.get(1).filter(|p| is_manifest(p)) {
                events.push(PluginEvent::Added(to.clone()));
            }
            events
        }
        EventKind::Modify(_) => manifests().map(PluginEvent::Changed).collect(),
        _ => Vec::new(),
    }
}

/// Apply one plugin event: drop the unit, then load it again unless removed.
pub fn apply(handler: &Handler, event: &PluginEvent) {
    let location = event.path().display().to_string();
    let removed = handler.uninstall(&location);

    if let PluginEvent::Removed(_) = event {
        info!("Unloaded {} plugin(s) from {}", removed, location);
        return;
    }

    match load_file(event.path()) {
        Ok(unit) => {
            let loaded = handler.install(unit);
            info!("Reloaded {} plugin(s) from {}", loaded, location);
        }
        Err(e) => warn!("Failed to reload plugin unit: {}", e),
    }
}

/// Consume plugin events until the watcher goes away.
pub async fn reload_loop(handler: Handler, mut events: mpsc::UnboundedReceiver<PluginEvent>) {
    while let Some(event) = events.recv().await {
        apply(&handler, &event);
    }
    debug!("Plugin watcher channel closed");
}
