//! Opaque entity identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque, store-generated identifier.
///
/// Keys every entity in the data model (viztrail, branch, workflow,
/// module). Callers must not assume any internal structure; the default
/// generator produces a time-ordered UUIDv7, but a store implementation
/// is free to assign ids however it likes as long as they are unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(transparent)]
pub struct Identifier(pub String);

impl Identifier {
    /// Wrap an existing string as an identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Generate a fresh, time-ordered identifier.
pub fn new_id() -> Identifier {
    Identifier(Uuid::now_v7().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_ordered() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        // UUIDv7 text form sorts with creation order for ids minted in sequence.
        assert!(a.as_str() < b.as_str());
    }

    #[test]
    fn roundtrips_through_json() {
        let id = new_id();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
