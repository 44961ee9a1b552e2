//! Typed read-through cache over Moka.

use std::hash::Hash;
use std::sync::Arc;

use moka::sync::Cache;

use super::CacheConfig;

/// Named, typed handle over a Moka cache.
///
/// Clones share the same entries. Repositories use it as a read-through
/// mirror of their store: [`TypedCache::get_or_load`] consults the loader
/// only on a miss and keeps what it returns.
pub struct TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    name: Arc<str>,
    entries: Cache<K, V>,
}

impl<K, V> Clone for TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            entries: self.entries.clone(),
        }
    }
}

impl<K, V> TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<Arc<str>>, config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = config.tti {
            builder = builder.time_to_idle(tti);
        }

        Self {
            name: name.into(),
            entries: builder.build(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key)
    }

    /// Cached value for `key`, or whatever `load` finds on a miss.
    ///
    /// A `None` from `load` is not cached, so the next lookup loads again.
    pub fn get_or_load<F>(&self, key: K, load: F) -> Option<V>
    where
        F: FnOnce() -> Option<V>,
    {
        if let Some(value) = self.entries.get(&key) {
            return Some(value);
        }
        let value = load()?;
        self.entries.insert(key, value.clone());
        Some(value)
    }
}

impl<K, V> std::fmt::Debug for TypedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCache")
            .field("name", &self.name)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_get_or_load_reads_through_once() {
        let cache: TypedCache<String, u32> = TypedCache::new("timers", CacheConfig::store_mirror());
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Some(86400)
        };

        assert_eq!(cache.get_or_load("a@g.us".into(), load), Some(86400));
        assert_eq!(cache.get_or_load("a@g.us".into(), || None), Some(86400));
        assert_eq!(loads.get(), 1);
        assert_eq!(cache.name(), "timers");
    }

    #[test]
    fn test_missing_values_are_not_cached() {
        let cache: TypedCache<String, u32> = TypedCache::new("timers", CacheConfig::store_mirror());
        assert_eq!(cache.get_or_load("b@g.us".into(), || None), None);
        assert_eq!(cache.get_or_load("b@g.us".into(), || Some(7)), Some(7));
    }
}
