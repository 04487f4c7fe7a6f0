//! Staff roles.

use serde::{Deserialize, Serialize};

/// Role of a staff account, carried in every identity token.
///
/// - `Admin` sees and modifies every shop; holds no shop assignment.
/// - `Manager` works within assigned shops and can manage staff sharing a shop.
/// - `User` reads within assigned shops and modifies only orders they created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(type_name = "user_role"))]
pub enum Role {
    Admin,
    Manager,
    User,
}

impl Role {
    /// Whether accounts with this role must be assigned at least one shop.
    #[must_use]
    pub const fn requires_shops(self) -> bool {
        !matches!(self, Self::Admin)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid role: {0}")]
pub struct RoleParseError(pub String);

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "Admin"),
            Self::Manager => write!(f, "Manager"),
            Self::User => write!(f, "User"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    /// Accepts the canonical names case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "user" => Ok(Self::User),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        for role in [Role::Admin, Role::Manager, Role::User] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert_eq!("MANAGER".parse::<Role>().unwrap(), Role::Manager);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_serde_uses_variant_names() {
        assert_eq!(serde_json::to_string(&Role::Manager).unwrap(), "\"Manager\"");
        assert!(serde_json::from_str::<Role>("\"manager\"").is_err());
    }

    #[test]
    fn test_only_admin_is_shopless() {
        assert!(!Role::Admin.requires_shops());
        assert!(Role::Manager.requires_shops());
        assert!(Role::User.requires_shops());
    }
}
