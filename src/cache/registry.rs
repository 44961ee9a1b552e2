//! Cache registry - named caches shared between repositories.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::{CacheConfig, TypedCache};

/// Registry of named typed caches.
///
/// Two repositories asking for the same name with the same key/value types
/// get handles to the same entries.
///
/// ## Example
///
/// ```rust
/// let registry = CacheRegistry::new();
/// let groups: TypedCache<String, GroupMetadata> =
///     registry.get_or_create("group_metadata", CacheConfig::store_mirror());
/// ```
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Arc<RwLock<HashMap<String, Slot>>>,
}

struct Slot {
    cache: Box<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Slot {
    fn typed<K, V>(&self) -> Option<TypedCache<K, V>>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        self.cache.downcast_ref::<TypedCache<K, V>>().cloned()
    }
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared cache for `name`, created with `config` on first use.
    ///
    /// A name already taken by other types yields a private cache that is
    /// not registered.
    pub fn get_or_create<K, V>(&self, name: &str, config: CacheConfig) -> TypedCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let mut caches = self.caches.write();

        if let Some(slot) = caches.get(name) {
            return match slot.typed() {
                Some(cache) => cache,
                None => {
                    warn!("Cache {} is taken by {}, using a private one", name, slot.type_name);
                    TypedCache::new(name, config)
                }
            };
        }

        debug!("Creating cache: {}", name);
        let cache = TypedCache::new(name, config);
        caches.insert(
            name.to_string(),
            Slot {
                cache: Box::new(cache.clone()),
                type_name: std::any::type_name::<TypedCache<K, V>>(),
            },
        );
        cache
    }

    /// Registered cache names, sorted.
    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.cache_names())
            .finish()
    }
}
