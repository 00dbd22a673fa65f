//! Labels shared by time entries and favorites.

use serde::{Deserialize, Serialize};

use crate::types::{TagId, ValidationError};

/// A free-form label. Tags live independently of the entries and favorites
/// that reference them; associations are link records held by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    /// Unique across all tags.
    pub name: String,
}

impl Tag {
    pub fn new(id: TagId, name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::Empty { field: "tag name" });
        }
        Ok(Self { id, name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_rejects_empty_name() {
        assert!(Tag::new(TagId::generate(), "").is_err());
        assert!(Tag::new(TagId::generate(), "infra").is_ok());
    }
}
