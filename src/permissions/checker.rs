//! Owner and admin checks.

use std::sync::Arc;

use tracing::debug;

use crate::events::jid;
use crate::store::GroupMetadata;

/// Permission checker.
///
/// Owners (from `OWNER_IDS`) pass the `from_owner` gate in every chat.
/// Admin status comes from cached group metadata.
#[derive(Clone, Debug, Default)]
pub struct Permissions {
    owners: Arc<Vec<String>>,
}

impl Permissions {
    /// Create a checker for the given owner jids.
    pub fn with_owners(owners: Vec<String>) -> Self {
        let owners = owners.iter().map(|o| jid::normalize(o)).collect();
        Self {
            owners: Arc::new(owners),
        }
    }

    /// Check if a jid belongs to a configured owner.
    #[inline]
    pub fn is_owner(&self, sender: &str) -> bool {
        let sender = jid::normalize(sender);
        self.owners.iter().any(|owner| *owner == sender)
    }

    /// Check if `sender` is an admin of the group described by `meta`.
    pub fn is_admin(&self, meta: Option<&GroupMetadata>, sender: &str) -> bool {
        let Some(meta) = meta else {
            debug!("No cached metadata, treating {} as member", sender);
            return false;
        };
        meta.is_admin(sender)
    }
}
