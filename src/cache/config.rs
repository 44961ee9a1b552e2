//! Cache sizing and expiry.

use std::time::Duration;

/// Capacity and expiry of one cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub max_capacity: u64,
    /// Evict entries this long after insertion.
    pub ttl: Option<Duration>,
    /// Evict entries not read for this long.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(300)),
            tti: None,
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn tti(mut self, duration: Duration) -> Self {
        self.tti = Some(duration);
        self
    }

    /// Mirror of a persistent store.
    ///
    /// No time-to-live: the store is authoritative and every write goes
    /// through the cache, so entries only age out when idle for an hour.
    pub fn store_mirror() -> Self {
        Self {
            ttl: None,
            ..Self::with_capacity(5_000)
        }
        .tti(Duration::from_secs(3600))
    }
}
