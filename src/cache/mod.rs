//! Cache module - Hot-path caching using Moka.
//!
//! Repositories keep decoded entities (group metadata, contacts) in a
//! `TypedCache` in front of their `Store`, so the dispatcher does not decode
//! JSON on every event.
//!
//! ## Architecture
//!
//! - `CacheRegistry` - Central registry holding all named caches
//! - `CacheConfig` - Capacity and expiry settings per cache
//! - `TypedCache` - Cheap-to-clone typed handle over a Moka cache

mod config;
mod registry;
mod typed;

pub use config::CacheConfig;
pub use registry::CacheRegistry;
pub use typed::TypedCache;
