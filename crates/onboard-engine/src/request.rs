//! Inbound mutation requests.

use onboard_client::{Document, EntityKind};
use serde_json::Value;
use std::fmt;

/// One inbound catalogue call. Lives for the call plus any compensation it triggers.
#[derive(Clone)]
pub struct MutationRequest {
    /// Entity payload.
    pub body: Document,
    /// Path segment the entity lives under, for kinds that use one.
    pub path: Option<String>,
    /// Caller's bearer token. Only ever sent to the local catalogue.
    pub token: String,
}

impl MutationRequest {
    /// Request carrying `body`.
    pub fn new(body: Document, token: impl Into<String>) -> Self {
        Self {
            body,
            path: None,
            token: token.into(),
        }
    }

    /// Request addressing an existing entity by identifier only.
    pub fn for_id(kind: EntityKind, id: &str, token: impl Into<String>) -> Self {
        let mut body = Document::new();
        body.insert(kind.id_key().to_string(), Value::String(id.to_string()));
        Self::new(body, token)
    }

    /// Set the path segment.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Identifier of the entity this request is about.
    pub fn identifier(&self, kind: EntityKind) -> Option<String> {
        kind.identifier_of(&self.body)
    }

    /// Path segment, if any.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

impl fmt::Debug for MutationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationRequest")
            .field("body", &self.body)
            .field("path", &self.path)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_for_id_uses_kind_key() {
        let req = MutationRequest::for_id(EntityKind::Instance, "pune", "tok");
        assert_eq!(req.body.get("instanceId"), Some(&json!("pune")));
        assert_eq!(req.identifier(EntityKind::Instance), Some("pune".to_string()));
        assert_eq!(req.path(), None);
    }

    #[test]
    fn test_with_path() {
        let req = MutationRequest::for_id(EntityKind::Instance, "pune", "tok").with_path("smartcity");
        assert_eq!(req.path(), Some("smartcity"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let req = MutationRequest::for_id(EntityKind::Item, "i", "secret-token");
        let shown = format!("{req:?}");
        assert!(!shown.contains("secret-token"));
        assert!(shown.contains("<redacted>"));
    }
}
