//! Identifier newtypes and field validation.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for domain fields.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A monetary field that must be strictly positive was not.
    #[error("{field} must be positive, got {value}")]
    NonPositiveAmount { field: &'static str, value: Decimal },

    /// A currency code that is not three ASCII letters.
    #[error("invalid currency code: {value}")]
    InvalidCurrencyCode { value: String },

    /// A template placeholder with no value supplied by the caller.
    #[error("unresolved placeholder {{{{{name}}}}} in template")]
    UnresolvedPlaceholder { name: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_entity_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Mints a fresh random ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_entity_id!(
    /// A validated client identifier.
    ClientId, "client ID"
);

define_entity_id!(
    /// A validated project identifier.
    ProjectId, "project ID"
);

define_entity_id!(
    /// A validated time-entry identifier.
    EntryId, "entry ID"
);

define_entity_id!(
    /// A validated tag identifier.
    TagId, "tag ID"
);

define_entity_id!(
    /// A validated favorite identifier.
    FavoriteId, "favorite ID"
);

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn entry_id_rejects_empty() {
        assert!(EntryId::new("").is_err());
        assert!(EntryId::new("entry-1").is_ok());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = ProjectId::generate();
        let b = ProjectId::generate();
        assert_ne!(a, b);
        assert!(!a.as_str().is_empty());
    }

    #[test]
    fn client_id_serde_roundtrip() {
        let id = ClientId::new("client-42").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"client-42\"");
        let parsed: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn id_serde_rejects_empty() {
        let result: Result<TagId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn favorite_id_as_ref() {
        let id = FavoriteId::new("fav-1").unwrap();
        let s: &str = id.as_ref();
        assert_eq!(s, "fav-1");
    }

    #[test]
    fn validation_error_messages_carry_context() {
        let err = ValidationError::NonPositiveAmount {
            field: "hourly rate",
            value: dec!(-1),
        };
        assert_eq!(err.to_string(), "hourly rate must be positive, got -1");

        let err = ValidationError::UnresolvedPlaceholder {
            name: "id".to_string(),
        };
        assert!(err.to_string().contains("{{id}}"));
    }
}
