//! Authorization policy.
//!
//! Every service asks [`authorize`] before touching data. The answer carries
//! a [`Scope`] that the service reuses both for single-entity checks and for
//! list filtering, so "get one" and "list all" can never disagree.
//!
//! | Role    | Orders                         | Customers           | Users                         |
//! |---------|--------------------------------|---------------------|-------------------------------|
//! | Admin   | everything                     | everything          | everything                    |
//! | Manager | own shops                      | with an order there | self, or sharing a shop (not Admin) |
//! | User    | read own shops, mutate if creator | via visible orders | self                       |

use std::collections::BTreeSet;

use atelier_core::{Role, ShopId};

use super::credentials::Identity;
use super::error::ServiceError;
use crate::models::{Order, User};

/// The shops a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Unrestricted,
    Shops(BTreeSet<ShopId>),
}

impl Scope {
    #[must_use]
    pub fn permits_shop(&self, shop: &ShopId) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Shops(shops) => shops.contains(shop),
        }
    }

    /// The shop restriction to apply to a store filter, if any.
    #[must_use]
    pub const fn shops(&self) -> Option<&BTreeSet<ShopId>> {
        match self {
            Self::Unrestricted => None,
            Self::Shops(shops) => Some(shops),
        }
    }
}

/// Something a caller wants to do, with its target where there is one.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// List or search orders.
    ReadOrders,
    ReadOrder(&'a Order),
    CreateOrder(&'a ShopId),
    /// Update status, update fields, or delete.
    MutateOrder(&'a Order),
    /// List or search customers.
    ReadCustomers,
    /// List or search users.
    ReadUsers,
    ReadUser(&'a User),
    /// Change name, email or password.
    ManageUser(&'a User),
    CreateUser {
        role: Role,
        shops: &'a BTreeSet<ShopId>,
    },
    /// Change role or shop assignment.
    ChangeAccess(&'a User),
    DeleteUser(&'a User),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Scope),
    Deny(String),
}

impl Decision {
    /// # Errors
    ///
    /// Returns `ServiceError::Unauthorized` for a denial.
    pub fn into_result(self) -> Result<Scope, ServiceError> {
        match self {
            Self::Allow(scope) => Ok(scope),
            Self::Deny(reason) => Err(ServiceError::Unauthorized(reason)),
        }
    }
}

/// Decide whether `identity` may perform `action`.
#[must_use]
pub fn authorize(identity: &Identity, action: Action<'_>) -> Decision {
    match identity.role {
        Role::Admin => Decision::Allow(Scope::Unrestricted),
        Role::Manager => manager(identity, action),
        Role::User => user(identity, action),
    }
}

fn own_scope(identity: &Identity) -> Scope {
    Scope::Shops(identity.shops.clone())
}

fn in_own_shop(identity: &Identity, shop: &ShopId, what: &str) -> Decision {
    if identity.shops.contains(shop) {
        Decision::Allow(own_scope(identity))
    } else {
        Decision::Deny(format!("{what} belongs to a shop you are not assigned to"))
    }
}

fn manager(identity: &Identity, action: Action<'_>) -> Decision {
    match action {
        Action::ReadOrders | Action::ReadCustomers | Action::ReadUsers => {
            Decision::Allow(own_scope(identity))
        }
        Action::ReadOrder(order) | Action::MutateOrder(order) => {
            in_own_shop(identity, &order.shop, "order")
        }
        Action::CreateOrder(shop) => in_own_shop(identity, shop, "order"),
        Action::ReadUser(target) | Action::ManageUser(target) => {
            if target.id == identity.user_id {
                Decision::Allow(own_scope(identity))
            } else if target.role == Role::Admin {
                Decision::Deny("managers cannot act on admin accounts".to_owned())
            } else if target.shares_shop_with(&identity.shops) {
                Decision::Allow(own_scope(identity))
            } else {
                Decision::Deny("user shares no shop with you".to_owned())
            }
        }
        Action::CreateUser { role, shops } => {
            if role == Role::Admin {
                Decision::Deny("managers cannot create admin accounts".to_owned())
            } else if shops.is_empty() || !shops.is_subset(&identity.shops) {
                Decision::Deny("new users must be assigned only to your shops".to_owned())
            } else {
                Decision::Allow(own_scope(identity))
            }
        }
        Action::ChangeAccess(_) | Action::DeleteUser(_) => {
            Decision::Deny("only admins can change access or delete users".to_owned())
        }
    }
}

fn user(identity: &Identity, action: Action<'_>) -> Decision {
    match action {
        Action::ReadOrders => Decision::Allow(own_scope(identity)),
        Action::ReadOrder(order) => in_own_shop(identity, &order.shop, "order"),
        Action::CreateOrder(shop) => in_own_shop(identity, shop, "order"),
        Action::MutateOrder(order) => {
            if order.creator_id != identity.user_id {
                Decision::Deny("only the creator of an order can modify it".to_owned())
            } else {
                in_own_shop(identity, &order.shop, "order")
            }
        }
        Action::ReadUser(target) | Action::ManageUser(target) if target.id == identity.user_id => {
            Decision::Allow(own_scope(identity))
        }
        _ => Decision::Deny("not permitted for your role".to_owned()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use atelier_core::{CustomerId, Email, Measurements, OrderId, OrderStatus, UserId};

    use super::*;
    use crate::models::OrderDates;

    fn shops(names: &[&str]) -> BTreeSet<ShopId> {
        names.iter().map(|n| ShopId::parse(n).unwrap()).collect()
    }

    fn identity(id: i32, role: Role, names: &[&str]) -> Identity {
        Identity {
            user_id: UserId::new(id),
            role,
            shops: shops(names),
        }
    }

    fn order(shop: &str, creator: i32) -> Order {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        Order {
            id: OrderId::new(1),
            order_number: "O-1".to_owned(),
            shop: ShopId::parse(shop).unwrap(),
            dates: OrderDates {
                order: day,
                trial: day,
                delivery: day,
                completion: None,
                cancelled: None,
            },
            customer_id: CustomerId::new(1),
            creator_id: UserId::new(creator),
            products: Vec::new(),
            status: OrderStatus::Pending,
            bill: None,
            measurements: Measurements::default(),
        }
    }

    fn account(id: i32, role: Role, names: &[&str]) -> User {
        User {
            id: UserId::new(id),
            name: format!("user{id}"),
            username: format!("user{id}"),
            email: Email::parse(&format!("user{id}@atelier.test")).unwrap(),
            password_hash: String::new(),
            role,
            shops: shops(names),
            orders: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn allowed(decision: &Decision) -> bool {
        matches!(decision, Decision::Allow(_))
    }

    #[test]
    fn test_admin_is_unrestricted() {
        let admin = identity(1, Role::Admin, &[]);
        assert_eq!(
            authorize(&admin, Action::MutateOrder(&order("S9", 5))),
            Decision::Allow(Scope::Unrestricted)
        );
        assert!(allowed(&authorize(&admin, Action::DeleteUser(&account(2, Role::User, &["S1"])))));
    }

    #[test]
    fn test_manager_scoped_to_own_shops() {
        let mgr = identity(2, Role::Manager, &["S1"]);
        assert!(allowed(&authorize(&mgr, Action::MutateOrder(&order("S1", 9)))));
        assert!(!allowed(&authorize(&mgr, Action::ReadOrder(&order("S2", 2)))));
        assert_eq!(
            authorize(&mgr, Action::ReadOrders),
            Decision::Allow(Scope::Shops(shops(&["S1"])))
        );
        assert!(!allowed(&authorize(&mgr, Action::CreateOrder(&ShopId::parse("S2").unwrap()))));
    }

    #[test]
    fn test_manager_user_management() {
        let mgr = identity(2, Role::Manager, &["S1", "S2"]);
        assert!(allowed(&authorize(&mgr, Action::ManageUser(&account(3, Role::User, &["S2"])))));
        assert!(!allowed(&authorize(&mgr, Action::ManageUser(&account(3, Role::User, &["S3"])))));
        assert!(!allowed(&authorize(&mgr, Action::ReadUser(&account(1, Role::Admin, &[])))));
        assert!(allowed(&authorize(&mgr, Action::ManageUser(&account(2, Role::Manager, &["S1"])))));
        assert!(!allowed(&authorize(&mgr, Action::ChangeAccess(&account(3, Role::User, &["S1"])))));
    }

    #[test]
    fn test_manager_create_user_subset_rule() {
        let mgr = identity(2, Role::Manager, &["S1", "S2"]);
        let ok = shops(&["S2"]);
        let outside = shops(&["S2", "S3"]);
        let none = BTreeSet::new();
        let create = |role, shops| authorize(&mgr, Action::CreateUser { role, shops });
        assert!(allowed(&create(Role::User, &ok)));
        assert!(!allowed(&create(Role::User, &outside)));
        assert!(!allowed(&create(Role::User, &none)));
        assert!(!allowed(&create(Role::Admin, &none)));
    }

    #[test]
    fn test_user_mutates_only_own_orders() {
        let user = identity(7, Role::User, &["S1"]);
        assert!(allowed(&authorize(&user, Action::ReadOrder(&order("S1", 8)))));
        assert!(!allowed(&authorize(&user, Action::MutateOrder(&order("S1", 8)))));
        assert!(allowed(&authorize(&user, Action::MutateOrder(&order("S1", 7)))));
        assert!(!allowed(&authorize(&user, Action::MutateOrder(&order("S2", 7)))));
    }

    #[test]
    fn test_user_sees_only_self() {
        let user = identity(7, Role::User, &["S1"]);
        assert!(allowed(&authorize(&user, Action::ReadUser(&account(7, Role::User, &["S1"])))));
        assert!(!allowed(&authorize(&user, Action::ReadUser(&account(8, Role::User, &["S1"])))));
        assert!(!allowed(&authorize(&user, Action::ReadUsers)));
        assert!(!allowed(&authorize(&user, Action::ReadCustomers)));
    }

    #[test]
    fn test_denial_becomes_unauthorized() {
        let err = Decision::Deny("nope".to_owned()).into_result().unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
