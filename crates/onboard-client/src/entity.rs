//! Entity vocabulary shared by every catalogue call.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Semi-structured catalogue payload. Keys are unique, nesting is preserved.
pub type Document = Map<String, Value>;

/// The three record types onboarded into the catalogues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A catalogue item (resource, resource group, provider...).
    Item,
    /// A catalogue instance.
    Instance,
    /// A catalogue domain.
    Domain,
}

impl EntityKind {
    /// REST collection segment for this kind.
    pub fn segment(&self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Instance => "instance",
            EntityKind::Domain => "domain",
        }
    }

    /// Request field carrying the identifier for this kind.
    pub fn id_key(&self) -> &'static str {
        match self {
            EntityKind::Item => "id",
            EntityKind::Instance => "instanceId",
            EntityKind::Domain => "domainId",
        }
    }

    /// Extract the identifier of this kind from a document.
    ///
    /// Looks up the kind-specific key first and falls back to `id`.
    pub fn identifier_of(&self, doc: &Document) -> Option<String> {
        [self.id_key(), "id"]
            .iter()
            .filter_map(|key| doc.get(*key))
            .find_map(|value| match value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

/// Which physical catalogue a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreTarget {
    /// The local catalogue. Authoritative, called with the caller's token.
    Local,
    /// The central catalogue. Called with a freshly minted admin token.
    Central,
}

impl fmt::Display for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreTarget::Local => f.write_str("local"),
            StoreTarget::Central => f.write_str("central"),
        }
    }
}

/// Unknown store selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid store target: {0:?}")]
pub struct InvalidTarget(pub String);

impl FromStr for StoreTarget {
    type Err = InvalidTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StoreTarget::Local),
            "central" => Ok(StoreTarget::Central),
            _ => Err(InvalidTarget(s.to_string())),
        }
    }
}

/// Catalogue operation routed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Insert a new entity.
    Create,
    /// Overwrite an existing entity.
    Update,
    /// Remove an entity.
    Delete,
    /// Read an entity. Never compensated.
    Get,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Get => "get",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!("local".parse::<StoreTarget>(), Ok(StoreTarget::Local));
        assert_eq!("Central".parse::<StoreTarget>(), Ok(StoreTarget::Central));
        assert_eq!(" LOCAL ".parse::<StoreTarget>(), Ok(StoreTarget::Local));
        assert_eq!(
            "both".parse::<StoreTarget>(),
            Err(InvalidTarget("both".to_string()))
        );
        assert!("".parse::<StoreTarget>().is_err());
    }

    #[test]
    fn test_identifier_prefers_kind_key() {
        let d = doc(json!({"id": "generic", "instanceId": "pune"}));
        assert_eq!(EntityKind::Instance.identifier_of(&d), Some("pune".to_string()));
        assert_eq!(EntityKind::Item.identifier_of(&d), Some("generic".to_string()));
    }

    #[test]
    fn test_identifier_falls_back_to_id() {
        let d = doc(json!({"id": "env"}));
        assert_eq!(EntityKind::Domain.identifier_of(&d), Some("env".to_string()));
    }

    #[test]
    fn test_identifier_missing_or_empty() {
        assert_eq!(EntityKind::Item.identifier_of(&doc(json!({"name": "x"}))), None);
        assert_eq!(EntityKind::Item.identifier_of(&doc(json!({"id": ""}))), None);
        assert_eq!(EntityKind::Item.identifier_of(&doc(json!({"id": 42}))), None);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(EntityKind::Instance.to_string(), "instance");
        assert_eq!(Operation::Delete.to_string(), "delete");
        assert_eq!(StoreTarget::Central.to_string(), "central");
    }
}
