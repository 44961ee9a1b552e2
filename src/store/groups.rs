//! Group metadata repository with cache-first architecture.
//!
//! Lookups go hot cache -> store -> client. Entries are never expired by
//! time; they are overwritten whenever a group event triggers a refresh.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{GroupMetadata, Store, StoreExt};
use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::socket::{Socket, SocketError};

/// Repository for group metadata.
pub struct GroupRepo {
    store: Arc<dyn Store>,
    cache: TypedCache<String, GroupMetadata>,
}

impl GroupRepo {
    pub fn new(store: Arc<dyn Store>, cache: &CacheRegistry) -> Self {
        let cache = cache.get_or_create("group_metadata", CacheConfig::store_mirror());
        Self { store, cache }
    }

    /// Cached metadata for a group, without touching the client.
    pub fn get(&self, jid: &str) -> Option<GroupMetadata> {
        self.cache.get_or_load(jid.to_string(), || {
            self.store
                .get_as::<GroupMetadata>(jid)
                .unwrap_or_else(|e| {
                    warn!("Failed to read group {} from {}: {}", jid, self.store.name(), e);
                    None
                })
        })
    }

    /// Store metadata in both the hot cache and the backing store.
    pub fn insert(&self, meta: GroupMetadata) {
        if let Err(e) = self.store.set_as(&meta.id, &meta) {
            warn!("Failed to persist group {}: {}", meta.id, e);
        }
        self.cache.insert(meta.id.clone(), meta);
    }

    /// Fetch fresh metadata from the client and cache it.
    pub async fn refresh(
        &self,
        socket: &dyn Socket,
        jid: &str,
    ) -> Result<GroupMetadata, SocketError> {
        let meta = socket.group_metadata(jid).await?;
        debug!(
            "Refreshed group {} ({} participants)",
            jid,
            meta.participants.len()
        );
        self.insert(meta.clone());
        Ok(meta)
    }

    /// Cached metadata, fetched from the client on first miss.
    ///
    /// A failed fetch is logged and leaves the cache empty, so the next
    /// lookup tries again.
    pub async fn get_or_fetch(&self, socket: &dyn Socket, jid: &str) -> Option<GroupMetadata> {
        if let Some(meta) = self.get(jid) {
            return Some(meta);
        }

        match self.refresh(socket, jid).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("Failed to fetch metadata for {}: {}", jid, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::testing::RecordingSocket;
    use crate::store::{MemoryStore, Participant};
    use std::sync::atomic::Ordering;

    fn group(id: &str) -> GroupMetadata {
        GroupMetadata {
            id: id.to_string(),
            subject: "Team".to_string(),
            participants: vec![Participant {
                id: Some("628111@s.whatsapp.net".into()),
                admin: Some("admin".into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_or_fetch_populates_lazily_once() {
        let socket = RecordingSocket::new("628000@s.whatsapp.net", "1@lid").with_group(group("1@g.us"));
        let repo = GroupRepo::new(Arc::new(MemoryStore::new("groups")), &CacheRegistry::new());

        assert!(repo.get("1@g.us").is_none());
        assert_eq!(repo.get_or_fetch(&socket, "1@g.us").await.unwrap().subject, "Team");
        assert_eq!(repo.get_or_fetch(&socket, "1@g.us").await.unwrap().subject, "Team");
        assert_eq!(socket.metadata_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_cache_empty() {
        let socket = RecordingSocket::new("628000@s.whatsapp.net", "1@lid");
        let repo = GroupRepo::new(Arc::new(MemoryStore::new("groups")), &CacheRegistry::new());

        assert!(repo.get_or_fetch(&socket, "2@g.us").await.is_none());
        assert!(repo.get_or_fetch(&socket, "2@g.us").await.is_none());
        assert_eq!(socket.metadata_fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_get_falls_back_to_store() {
        let store = Arc::new(MemoryStore::new("groups"));
        store.set_as("3@g.us", &group("3@g.us")).unwrap();

        let repo = GroupRepo::new(store, &CacheRegistry::new());
        assert!(repo.get("3@g.us").unwrap().is_admin("628111@s.whatsapp.net"));
    }
}
