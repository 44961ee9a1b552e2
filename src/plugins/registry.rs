//! Command and listener registry.
//!
//! Three structures are kept in step:
//!
//! - `plugins`: registration id -> plugin (the source of truth)
//! - `commands`: lowercased, prefix-expanded literal -> registration id
//! - `listeners`: registration ids of plugins without commands
//!
//! Registration ids carry the hash of their unit's location, so a whole
//! unit can be dropped on hot reload. Both indexes are rebuilt from
//! `plugins` whenever something is removed or the prefixes change.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::{Plugin, PluginKind};
use crate::utils::hash_location;

/// Identifies one registered plugin.
///
/// Ordered by registration sequence, so iteration follows load order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId {
    seq: u64,
    unit: String,
}

#[derive(Debug, Default)]
pub struct Registry {
    prefixes: Vec<String>,
    next_seq: u64,
    plugins: BTreeMap<RegistrationId, Arc<Plugin>>,
    commands: HashMap<String, RegistrationId>,
    listeners: BTreeSet<RegistrationId>,
}

impl Registry {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self {
            prefixes,
            ..Default::default()
        }
    }

    /// Register the plugins of one unit.
    pub fn register(&mut self, location: &str, plugins: Vec<Plugin>) -> Vec<RegistrationId> {
        let unit = hash_location(location);
        let mut ids = Vec::with_capacity(plugins.len());

        for mut plugin in plugins {
            plugin.location = location.to_string();
            let id = RegistrationId {
                seq: self.next_seq,
                unit: unit.clone(),
            };
            self.next_seq += 1;

            let plugin = Arc::new(plugin);
            self.index(&id, &plugin);
            self.plugins.insert(id.clone(), plugin);
            ids.push(id);
        }

        debug!("Registered {} plugin(s) from {}", ids.len(), location);
        ids
    }

    /// Drop every plugin registered from `location`. Returns how many.
    pub fn unregister(&mut self, location: &str) -> usize {
        let unit = hash_location(location);
        let before = self.plugins.len();
        self.plugins.retain(|id, _| id.unit != unit);
        let removed = before - self.plugins.len();

        if removed > 0 {
            self.rebuild();
            debug!("Unregistered {} plugin(s) from {}", removed, location);
        }
        removed
    }

    /// Replace the active prefixes and rebuild the command index.
    pub fn set_prefix(&mut self, prefixes: Vec<String>) {
        self.prefixes = prefixes
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        self.rebuild();
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Find the command plugin for a pattern.
    pub fn resolve(&self, pattern: &str) -> Option<Arc<Plugin>> {
        let id = self.commands.get(&pattern.to_lowercase())?;
        self.plugins.get(id).cloned()
    }

    pub fn is_command(&self, pattern: &str) -> bool {
        self.commands.contains_key(&pattern.to_lowercase())
    }

    /// Listeners in registration order.
    pub fn listeners(&self) -> Vec<Arc<Plugin>> {
        self.listeners
            .iter()
            .filter_map(|id| self.plugins.get(id).cloned())
            .collect()
    }

    /// Command plugins in registration order.
    pub fn commands(&self) -> Vec<Arc<Plugin>> {
        self.plugins
            .values()
            .filter(|p| !p.is_listener())
            .cloned()
            .collect()
    }

    /// Every prefix-expanded command key, sorted.
    pub fn command_keys(&self) -> BTreeSet<String> {
        self.commands.keys().cloned().collect()
    }

    /// Locations of the loaded units.
    pub fn locations(&self) -> BTreeSet<String> {
        self.plugins.values().map(|p| p.location.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    fn rebuild(&mut self) {
        self.commands.clear();
        self.listeners.clear();
        let plugins: Vec<_> = self
            .plugins
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();
        for (id, plugin) in plugins {
            self.index(&id, &plugin);
        }
    }

    fn index(&mut self, id: &RegistrationId, plugin: &Plugin) {
        match &plugin.kind {
            PluginKind::Listener => {
                self.listeners.insert(id.clone());
            }
            PluginKind::Command(literals) => {
                for key in expand_keys(literals, &self.prefixes, plugin.no_prefix) {
                    self.commands.insert(key, id.clone());
                }
            }
        }
    }
}

/// Index keys for a set of literals.
fn expand_keys(literals: &[String], prefixes: &[String], no_prefix: bool) -> Vec<String> {
    if no_prefix {
        return literals.iter().map(|l| l.to_lowercase()).collect();
    }
    literals
        .iter()
        .flat_map(|literal| {
            prefixes
                .iter()
                .map(move |prefix| format!("{}{}", prefix, literal).to_lowercase())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(literals: &[&str], no_prefix: bool) -> Plugin {
        Plugin::builder()
            .commands(literals.iter().copied())
            .no_prefix(no_prefix)
            .exec(|_| async { Ok(()) })
            .build()
            .unwrap()
    }

    fn listener() -> Plugin {
        Plugin::builder().exec(|_| async { Ok(()) }).build().unwrap()
    }

    fn keys(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prefix_expansion() {
        let mut registry = Registry::new(vec!["/".into(), "!".into()]);
        registry.register("a", vec![command(&["ping", "p"], false)]);
        assert_eq!(registry.command_keys(), keys(&["/ping", "/p", "!ping", "!p"]));

        let mut registry = Registry::new(vec!["/".into(), "!".into()]);
        registry.register("a", vec![command(&["ping", "p"], true)]);
        assert_eq!(registry.command_keys(), keys(&["ping", "p"]));
    }

    #[test]
    fn test_keys_are_lowercased() {
        let mut registry = Registry::new(vec![".".into()]);
        registry.register("a", vec![command(&["Menu"], false)]);
        assert!(registry.is_command(".MENU"));
        assert!(registry.resolve(".menu").is_some());
    }

    #[test]
    fn test_set_prefix_rebuilds_exactly() {
        let mut registry = Registry::new(vec!["/".into()]);
        registry.register("a", vec![command(&["ping", "p"], false)]);
        registry.register("b", vec![command(&["menu"], false), command(&["raw"], true)]);

        registry.set_prefix(vec![".".into(), "#".into()]);
        registry.set_prefix(vec![".".into(), "#".into()]);
        assert_eq!(
            registry.command_keys(),
            keys(&[".ping", ".p", "#ping", "#p", ".menu", "#menu", "raw"])
        );
    }

    #[test]
    fn test_unregister_keeps_overlapping_literals() {
        let mut registry = Registry::new(vec!["/".into()]);
        registry.register("a", vec![command(&["ping"], false), listener()]);
        registry.register("b", vec![command(&["ping", "pong"], false), listener()]);

        assert_eq!(registry.resolve("/ping").unwrap().location, "b");

        assert_eq!(registry.locations(), keys(&["a", "b"]));
        assert_eq!(registry.unregister("b"), 2);
        assert_eq!(registry.locations(), keys(&["a"]));
        assert_eq!(registry.len(), 2);
        assert!(!registry.is_command("/pong"));
        assert_eq!(registry.resolve("/ping").unwrap().location, "a");
        assert!(registry.listeners().iter().all(|l| l.location == "a"));
        assert_eq!(registry.listeners().len(), 1);

        assert_eq!(registry.unregister("a"), 2);
        assert!(registry.command_keys().is_empty());
        assert!(registry.listeners().is_empty());
        assert_eq!(registry.unregister("a"), 0);
    }

    #[test]
    fn test_listeners_in_registration_order() {
        let mut registry = Registry::new(vec![]);
        for location in ["c", "a", "b"] {
            registry.register(location, vec![listener()]);
        }
        let order: Vec<_> = registry.listeners().iter().map(|l| l.location.clone()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
    }
}
