//! In-memory store.
//!
//! A transaction holds the table lock for its whole lifetime and works on a
//! private copy of the tables; commit swaps the copy in, rollback (or drop)
//! throws it away. This gives serializable transactions with the same
//! unique-constraint behaviour as the `PostgreSQL` schema.
//!
//! [`MemoryStore::with_fault`] makes a chosen operation fail, which lets tests
//! check that a failure part-way through a lifecycle operation leaves nothing
//! behind.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use atelier_core::{CustomerId, Email, OrderId, ShopId, UserId};

use super::RepositoryError;
use super::store::{EntityStore, StoreTransaction};
use crate::models::order::contains_ignore_case;
use crate::models::{
    Customer, CustomerFilter, NewCustomer, NewOrder, NewUser, Order, OrderFilter, OrderKey, User,
    UserFilter,
};

/// A store operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    UpsertCustomer,
    InsertOrder,
    UpdateOrder,
    DeleteOrder,
    LinkCustomerOrder,
    LinkUserOrder,
    UnlinkCustomerOrder,
    UnlinkUserOrder,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    customers: BTreeMap<CustomerId, Customer>,
    orders: BTreeMap<OrderId, Order>,
    last_user_id: i32,
    last_customer_id: i32,
    last_order_id: i32,
}

/// Committed contents of a [`MemoryStore`], for assertions.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub customers: Vec<Customer>,
    pub orders: Vec<Order>,
}

/// Store backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_at: Option<FailPoint>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the same tables whose transactions fail at `point`.
    #[must_use]
    pub fn with_fault(&self, point: FailPoint) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            fail_at: Some(point),
        }
    }

    /// Committed state. Waits for any open transaction to finish.
    pub async fn snapshot(&self) -> Snapshot {
        let tables = self.tables.lock().await;
        Snapshot {
            users: tables.users.values().cloned().collect(),
            customers: tables.customers.values().cloned().collect(),
            orders: tables.orders.values().cloned().collect(),
        }
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            work,
            fail_at: self.fail_at,
        }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
    fail_at: Option<FailPoint>,
}

impl MemoryTransaction {
    fn check(&self, point: FailPoint) -> Result<(), RepositoryError> {
        if self.fail_at == Some(point) {
            tracing::debug!(?point, "injected store failure");
            return Err(RepositoryError::Database(sqlx::Error::Protocol(format!(
                "injected failure at {point:?}"
            ))));
        }
        Ok(())
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut User, RepositoryError> {
        self.work.users.get_mut(&id).ok_or(RepositoryError::NotFound)
    }

    fn customer_mut(&mut self, id: CustomerId) -> Result<&mut Customer, RepositoryError> {
        self.work
            .customers
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound)
    }

    fn key_taken(&self, key: &OrderKey, except: Option<OrderId>) -> bool {
        self.work
            .orders
            .values()
            .any(|o| Some(o.id) != except && o.shop == key.shop && o.order_number == key.order_number)
    }

    fn email_taken(&self, email: &Email, except: Option<UserId>) -> bool {
        self.work
            .users
            .values()
            .any(|u| Some(u.id) != except && &u.email == email)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.work.users.get(&id).cloned())
    }

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .work
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_user_by_email(&mut self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self.work.users.values().find(|u| &u.email == email).cloned())
    }

    async fn find_users(&mut self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .work
            .users
            .values()
            .filter(|u| {
                filter.ids.as_ref().is_none_or(|ids| ids.contains(&u.id))
                    && filter
                        .sharing_shops
                        .as_ref()
                        .is_none_or(|shops| u.shares_shop_with(shops))
                    && filter.exclude_role.is_none_or(|role| u.role != role)
                    && filter
                        .name_contains
                        .as_deref()
                        .is_none_or(|name| contains_ignore_case(&u.name, name))
            })
            .cloned()
            .collect())
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, RepositoryError> {
        if self.work.users.values().any(|u| u.username == user.username) {
            return Err(RepositoryError::Conflict("username already exists".to_owned()));
        }
        if self.email_taken(&user.email, None) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        self.work.last_user_id += 1;
        let created = User {
            id: UserId::new(self.work.last_user_id),
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            shops: user.shops.clone(),
            orders: Vec::new(),
            created_at: Utc::now(),
        };
        self.work.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_user(&mut self, user: &User) -> Result<User, RepositoryError> {
        if self.email_taken(&user.email, Some(user.id)) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let stored = self.user_mut(user.id)?;
        stored.name.clone_from(&user.name);
        stored.email = user.email.clone();
        stored.password_hash.clone_from(&user.password_hash);
        stored.role = user.role;
        stored.shops.clone_from(&user.shops);
        Ok(stored.clone())
    }

    async fn delete_user(&mut self, id: UserId) -> Result<(), RepositoryError> {
        if self.work.orders.values().any(|o| o.creator_id == id) {
            return Err(RepositoryError::Conflict(
                "user is still the creator of orders".to_owned(),
            ));
        }
        self.work
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn distinct_shops(&mut self) -> Result<Vec<ShopId>, RepositoryError> {
        let mut shops: Vec<ShopId> = self
            .work
            .users
            .values()
            .flat_map(|u| u.shops.iter().cloned())
            .collect();
        shops.sort();
        shops.dedup();
        Ok(shops)
    }

    async fn link_user_order(
        &mut self,
        user: UserId,
        order: OrderId,
    ) -> Result<(), RepositoryError> {
        self.check(FailPoint::LinkUserOrder)?;
        self.user_mut(user)?.orders.push(order);
        Ok(())
    }

    async fn unlink_user_order(
        &mut self,
        user: UserId,
        order: OrderId,
    ) -> Result<(), RepositoryError> {
        self.check(FailPoint::UnlinkUserOrder)?;
        self.user_mut(user)?.orders.retain(|&o| o != order);
        Ok(())
    }

    async fn find_customer(
        &mut self,
        id: CustomerId,
    ) -> Result<Option<Customer>, RepositoryError> {
        Ok(self.work.customers.get(&id).cloned())
    }

    async fn find_customers(
        &mut self,
        filter: &CustomerFilter,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let orders = &self.work.orders;
        Ok(self
            .work
            .customers
            .values()
            .filter(|c| {
                filter.ids.as_ref().is_none_or(|ids| ids.contains(&c.id))
                    && filter.term.as_deref().is_none_or(|term| {
                        contains_ignore_case(&c.name, term)
                            || contains_ignore_case(c.phone.as_str(), term)
                    })
                    && filter.ordered_in.as_ref().is_none_or(|shops| {
                        orders
                            .values()
                            .any(|o| o.customer_id == c.id && shops.contains(&o.shop))
                    })
            })
            .cloned()
            .collect())
    }

    async fn upsert_customer(
        &mut self,
        customer: &NewCustomer,
    ) -> Result<Customer, RepositoryError> {
        self.check(FailPoint::UpsertCustomer)?;
        if let Some(existing) = self
            .work
            .customers
            .values_mut()
            .find(|c| c.phone == customer.phone)
        {
            customer.name.clone_into(&mut existing.name);
            if let Some(measurements) = &customer.measurements {
                existing.measurements = measurements.clone();
            }
            return Ok(existing.clone());
        }

        self.work.last_customer_id += 1;
        let created = Customer {
            id: CustomerId::new(self.work.last_customer_id),
            name: customer.name.clone(),
            phone: customer.phone.clone(),
            orders: Vec::new(),
            measurements: customer.measurements.clone().unwrap_or_default(),
        };
        self.work.customers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn link_customer_order(
        &mut self,
        customer: CustomerId,
        order: OrderId,
    ) -> Result<(), RepositoryError> {
        self.check(FailPoint::LinkCustomerOrder)?;
        self.customer_mut(customer)?.orders.push(order);
        Ok(())
    }

    async fn unlink_customer_order(
        &mut self,
        customer: CustomerId,
        order: OrderId,
    ) -> Result<(), RepositoryError> {
        self.check(FailPoint::UnlinkCustomerOrder)?;
        self.customer_mut(customer)?.orders.retain(|&o| o != order);
        Ok(())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn find_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        Ok(self
            .work
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect())
    }

    async fn find_existing_keys(
        &mut self,
        keys: &[OrderKey],
    ) -> Result<Vec<OrderKey>, RepositoryError> {
        Ok(keys
            .iter()
            .filter(|key| self.key_taken(key, None))
            .cloned()
            .collect())
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        self.check(FailPoint::InsertOrder)?;
        if self.key_taken(&order.key, None) {
            return Err(RepositoryError::Conflict(format!(
                "order {} already exists",
                order.key
            )));
        }
        if !self.work.customers.contains_key(&order.customer_id)
            || !self.work.users.contains_key(&order.creator_id)
        {
            return Err(RepositoryError::DataCorruption(
                "order references a missing customer or creator".to_owned(),
            ));
        }
        self.work.last_order_id += 1;
        let created = Order {
            id: OrderId::new(self.work.last_order_id),
            order_number: order.key.order_number.clone(),
            shop: order.key.shop.clone(),
            dates: order.dates.clone(),
            customer_id: order.customer_id,
            creator_id: order.creator_id,
            products: order.products.clone(),
            status: order.status,
            bill: order.bill.clone(),
            measurements: order.measurements.clone(),
        };
        self.work.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_order(&mut self, order: &Order) -> Result<Order, RepositoryError> {
        self.check(FailPoint::UpdateOrder)?;
        if self.key_taken(&order.key(), Some(order.id)) {
            return Err(RepositoryError::Conflict(format!(
                "order {} already exists",
                order.key()
            )));
        }
        let stored = self
            .work
            .orders
            .get_mut(&order.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = Order {
            customer_id: stored.customer_id,
            creator_id: stored.creator_id,
            ..order.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<(), RepositoryError> {
        self.check(FailPoint::DeleteOrder)?;
        self.work
            .orders
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        self.check(FailPoint::Commit)?;
        let Self {
            mut guard, work, ..
        } = *self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use atelier_core::{Measurements, PhoneNumber, Role};

    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            name: username.to_owned(),
            username: username.to_owned(),
            email: Email::parse(&format!("{username}@atelier.test")).unwrap(),
            password_hash: "hash".to_owned(),
            role: Role::User,
            shops: BTreeSet::from([ShopId::parse("S1").unwrap()]),
        }
    }

    #[tokio::test]
    async fn test_upsert_customer_merges_on_phone() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let phone = PhoneNumber::parse("555-1").unwrap();
        let measured = Measurements {
            shirt: Some(atelier_core::Shirt::default()),
            ..Measurements::default()
        };

        let first = tx
            .upsert_customer(&NewCustomer {
                name: "Alice".to_owned(),
                phone: phone.clone(),
                measurements: Some(measured.clone()),
            })
            .await
            .unwrap();
        let second = tx
            .upsert_customer(&NewCustomer {
                name: "Alice B".to_owned(),
                phone,
                measurements: None,
            })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Alice B");
        assert_eq!(second.measurements, measured);
        assert_eq!(tx.find_customers(&CustomerFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&new_user("ravi")).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(store.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_drop_discards_writes() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_user(&new_user("ravi")).await.unwrap();
        }
        assert!(store.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.insert_user(&new_user("ravi")).await.unwrap();
        tx.commit().await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.users.len(), 1);
        assert_eq!(snapshot.users[0].id, user.id);
    }

    #[tokio::test]
    async fn test_unique_username_and_email() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_user(&new_user("ravi")).await.unwrap();

        let err = tx.insert_user(&new_user("ravi")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        let mut other = new_user("meena");
        other.email = Email::parse("ravi@atelier.test").unwrap();
        let err = tx.insert_user(&other).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_injected_commit_failure_keeps_old_state() {
        let store = MemoryStore::new();
        let faulty = store.with_fault(FailPoint::Commit);
        let mut tx = faulty.begin().await.unwrap();
        tx.insert_user(&new_user("ravi")).await.unwrap();
        assert!(tx.commit().await.is_err());

        assert!(store.snapshot().await.users.is_empty());
    }

    #[tokio::test]
    async fn test_link_and_unlink_missing_user() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .link_user_order(UserId::new(9), OrderId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
