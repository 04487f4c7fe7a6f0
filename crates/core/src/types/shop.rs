//! Shop identifiers.

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShopIdError {
    #[error("shop cannot be empty")]
    Empty,
    #[error("shop must be at most {max} characters")]
    TooLong { max: usize },
}

/// The name of a shop (branch) an order belongs to.
///
/// Shops have no table of their own; they exist as the values assigned to
/// staff and stamped on orders. Comparison is exact after trimming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct ShopId(String);

impl ShopId {
    pub const MAX_LENGTH: usize = 64;

    /// # Errors
    ///
    /// Returns a [`ShopIdError`] if the trimmed name is empty or too long.
    pub fn parse(s: &str) -> Result<Self, ShopIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ShopIdError::Empty);
        }
        if s.chars().count() > Self::MAX_LENGTH {
            return Err(ShopIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(s.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ShopId {
    type Err = ShopIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ShopId {
    type Error = ShopIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShopId> for String {
    fn from(shop: ShopId) -> Self {
        shop.0
    }
}

impl AsRef<str> for ShopId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
super::contact::text_column!(ShopId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        assert_eq!(ShopId::parse("  Andheri ").unwrap().as_str(), "Andheri");
    }

    #[test]
    fn test_parse_rejects_blank_and_long() {
        assert_eq!(ShopId::parse(" \t"), Err(ShopIdError::Empty));
        assert!(matches!(
            ShopId::parse(&"s".repeat(65)),
            Err(ShopIdError::TooLong { .. })
        ));
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        assert!(serde_json::from_str::<ShopId>("\"\"").is_err());
        assert_eq!(
            serde_json::from_str::<ShopId>("\"S1\"").unwrap(),
            ShopId::parse("S1").unwrap()
        );
    }
}
