//! Cached entity models.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A member of a group as reported by the client.
///
/// The same account can be listed under its phone-number jid, its
/// linked-device lid, or both, depending on the group's addressing mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub jid: Option<String>,

    #[serde(default)]
    pub lid: Option<String>,

    /// `admin`, `superadmin` or absent.
    #[serde(default)]
    pub admin: Option<String>,
}

impl Participant {
    /// Whether any of the participant's identifiers equals `jid`.
    pub fn matches(&self, jid: &str) -> bool {
        [&self.id, &self.jid, &self.lid]
            .into_iter()
            .any(|candidate| candidate.as_deref() == Some(jid))
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.admin.as_deref(), Some("admin") | Some("superadmin"))
    }
}

/// Group metadata returned by the client's `groupMetadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadata {
    pub id: String,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub participants: Vec<Participant>,

    /// Disappearing-message duration in seconds, when enabled.
    #[serde(default)]
    pub ephemeral_duration: Option<u32>,

    /// Fields we do not model, kept so nothing is lost on write-back.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GroupMetadata {
    /// Whether `jid` is an admin or superadmin of this group.
    pub fn is_admin(&self, jid: &str) -> bool {
        self.participants
            .iter()
            .any(|p| p.matches(jid) && p.is_admin())
    }
}

/// Contact name cache entry, keyed by jid in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
}
