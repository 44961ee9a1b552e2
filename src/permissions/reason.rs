//! Gate outcomes.

use serde::Serialize;
use serde_json::Value;

/// Outcome of a gating check.
///
/// A `Reason` is immutable once built; the `author`/`message`/`data`
/// setters consume and return the value, so a reason handed to one gate
/// cannot be changed behind another gate's back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reason {
    pub success: bool,
    pub code: String,
    pub author: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Reason {
    fn new(success: bool, code: impl Into<String>) -> Self {
        Self {
            success,
            code: code.into(),
            author: String::new(),
            message: String::new(),
            data: None,
        }
    }

    /// A passing reason.
    pub fn pass(code: impl Into<String>) -> Self {
        Self::new(true, code)
    }

    /// A failing reason.
    pub fn fail(code: impl Into<String>) -> Self {
        Self::new(false, code)
    }

    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<bool> for Reason {
    fn from(success: bool) -> Self {
        Self::new(success, "predicate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builders_do_not_alias() {
        let base = Reason::fail("not-owner").author("owner-gate");
        let detailed = base.clone().message("sender is not an owner").data(json!({"jid": "x"}));

        assert_eq!(base.message, "");
        assert_eq!(base.data, None);
        assert_eq!(detailed.author, "owner-gate");
        assert!(!detailed.success);
    }

    #[test]
    fn test_from_bool() {
        assert!(Reason::from(true).success);
        assert_eq!(Reason::from(false).code, "predicate");
    }
}
