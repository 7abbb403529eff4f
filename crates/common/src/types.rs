use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Length of a canonical identifier: 24 hexadecimal characters.
pub const CANONICAL_ID_LEN: usize = 24;

/// Returned when a string is not a canonical identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} id: {value:?} (expected {CANONICAL_ID_LEN} hex characters)")]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: String,
}

/// Returns true if `s` is exactly [`CANONICAL_ID_LEN`] ASCII hex digits.
pub fn is_canonical_id(s: &str) -> bool {
    s.len() == CANONICAL_ID_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn random_canonical() -> String {
    let mut s = Uuid::new_v4().simple().to_string();
    s.truncate(CANONICAL_ID_LEN);
    s
}

macro_rules! canonical_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(random_canonical())
            }

            /// Parses a canonical identifier, normalizing to lowercase.
            pub fn parse(s: &str) -> Result<Self, InvalidId> {
                if is_canonical_id(s) {
                    Ok(Self(s.to_ascii_lowercase()))
                } else {
                    Err(InvalidId {
                        kind: $kind,
                        value: s.to_string(),
                    })
                }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = InvalidId;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

canonical_id!(
    /// Identifier of a catalog product.
    ProductId,
    "product"
);

canonical_id!(
    /// Identifier of a variant embedded in a product.
    VariantId,
    "variant"
);

canonical_id!(
    /// Identifier of a persisted order.
    OrderId,
    "order"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_canonical_and_unique() {
        let a = ProductId::new();
        let b = ProductId::new();
        assert_ne!(a, b);
        assert!(is_canonical_id(a.as_str()));
        assert_eq!(a.as_str().len(), CANONICAL_ID_LEN);
    }

    #[test]
    fn parse_accepts_mixed_case_and_normalizes() {
        let id = VariantId::parse("507F1F77BCF86CD799439011").unwrap();
        assert_eq!(id.as_str(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(ProductId::parse("").is_err());
        assert!(ProductId::parse("507f1f77bcf86cd79943901").is_err());
        assert!(ProductId::parse("507f1f77bcf86cd7994390111").is_err());
        assert!(ProductId::parse("zzzf1f77bcf86cd799439011").is_err());

        let err = OrderId::parse("nope").unwrap_err();
        assert_eq!(err.kind, "order");
    }

    #[test]
    fn deserialization_validates_format() {
        let ok: ProductId = serde_json::from_str("\"507f1f77bcf86cd799439011\"").unwrap();
        assert_eq!(ok.to_string(), "507f1f77bcf86cd799439011");

        let bad: Result<ProductId, _> = serde_json::from_str("\"not-an-id\"");
        assert!(bad.is_err());
    }
}
