//! Contact name repository.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{Contact, Store, StoreExt};
use crate::cache::{CacheConfig, CacheRegistry, TypedCache};

/// Repository mapping jids to display names.
pub struct ContactRepo {
    store: Arc<dyn Store>,
    cache: TypedCache<String, Contact>,
}

impl ContactRepo {
    pub fn new(store: Arc<dyn Store>, cache: &CacheRegistry) -> Self {
        let cache = cache.get_or_create("contacts", CacheConfig::store_mirror());
        Self { store, cache }
    }

    pub fn get(&self, jid: &str) -> Option<Contact> {
        self.cache.get_or_load(jid.to_string(), || {
            self.store.get_as::<Contact>(jid).unwrap_or_else(|e| {
                warn!("Failed to read contact {}: {}", jid, e);
                None
            })
        })
    }

    /// Display name for a jid, if one was ever observed.
    pub fn name(&self, jid: &str) -> Option<String> {
        self.get(jid).map(|c| c.name)
    }

    /// Insert or update a contact. Unchanged names are not rewritten.
    pub fn upsert(&self, jid: &str, name: &str) {
        if jid.is_empty() || name.is_empty() {
            return;
        }
        if self.get(jid).is_some_and(|c| c.name == name) {
            return;
        }

        let contact = Contact {
            name: name.to_string(),
        };
        debug!("Contact {} is now {:?}", jid, name);

        if let Err(e) = self.store.set_as(jid, &contact) {
            warn!("Failed to persist contact {}: {}", jid, e);
        }
        self.cache.insert(jid.to_string(), contact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_upsert_overwrites_name() {
        let store = Arc::new(MemoryStore::new("contacts"));
        let repo = ContactRepo::new(store.clone(), &CacheRegistry::new());

        repo.upsert("628@s.whatsapp.net", "Ana");
        repo.upsert("628@s.whatsapp.net", "Ana B");
        repo.upsert("", "Nobody");

        assert_eq!(repo.name("628@s.whatsapp.net").as_deref(), Some("Ana B"));
        assert_eq!(store.keys().unwrap().len(), 1);
    }
}
