//! Staff user domain types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use atelier_core::{Email, OrderId, Role, ShopId, UserId};

use super::order::OrderDetails;

/// A staff account (domain type).
///
/// `orders` lists the orders this user created and is only ever changed by
/// the order lifecycle through the store's link/unlink operations.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
    /// Empty for admins, who implicitly cover every shop.
    pub shops: BTreeSet<ShopId>,
    pub orders: Vec<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this user and `shops` have at least one shop in common.
    #[must_use]
    pub fn shares_shop_with(&self, shops: &BTreeSet<ShopId>) -> bool {
        !self.shops.is_disjoint(shops)
    }
}

/// Data for inserting a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: Email,
    pub password_hash: String,
    pub role: Role,
    pub shops: BTreeSet<ShopId>,
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub username: String,
    pub email: Email,
    pub role: Role,
    pub shops: BTreeSet<ShopId>,
    pub orders: Vec<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            shops: user.shops.clone(),
            orders: user.orders.clone(),
            created_at: user.created_at,
        }
    }
}

/// A user together with the orders they created that the caller may see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: UserView,
    #[serde(rename = "orderDetails")]
    pub order_details: Vec<OrderDetails>,
}

/// Store-level filter for listing users. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub ids: Option<Vec<UserId>>,
    /// Users assigned to at least one of these shops.
    pub sharing_shops: Option<BTreeSet<ShopId>>,
    pub exclude_role: Option<Role>,
    /// Case-insensitive substring of the user's name.
    pub name_contains: Option<String>,
}

/// Request body for `POST /users`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: Email,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub shops: BTreeSet<ShopId>,
}

/// Request body for `PUT /users/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<Email>,
}

/// Request body for `PUT /users/{id}/password`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PasswordResetRequest {
    pub new_password: String,
}

/// Request body for `PUT /users/{id}/access`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessChangeRequest {
    pub role: Role,
    #[serde(default)]
    pub shops: BTreeSet<ShopId>,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserView,
}
