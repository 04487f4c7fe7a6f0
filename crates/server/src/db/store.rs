//! The store seam between services and persistence.
//!
//! The interface is plain CRUD plus the back-reference maintenance calls
//! (`link_*` / `unlink_*`). Joins are done by the callers with batch lookups.

use async_trait::async_trait;

use atelier_core::{CustomerId, Email, OrderId, ShopId, UserId};

use super::RepositoryError;
use crate::models::{
    Customer, CustomerFilter, NewCustomer, NewOrder, NewUser, Order, OrderFilter, OrderKey, User,
    UserFilter,
};

/// A handle that can open transactions.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if no transaction can be started.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError>;

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if it is not.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// An open transaction.
///
/// Dropping a transaction without committing discards its writes. Services
/// still call [`rollback`](Self::rollback) explicitly so that a failed
/// rollback is logged.
///
/// Unique constraints (`users.username`, `users.email`, `customers.phone`,
/// `orders (shop, order_number)`) are enforced by the store and reported as
/// `RepositoryError::Conflict`. Updates and deletes of a missing row report
/// `RepositoryError::NotFound`.
#[async_trait]
pub trait StoreTransaction: Send {
    // ---------------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------------

    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError>;

    async fn find_user_by_email(&mut self, email: &Email) -> Result<Option<User>, RepositoryError>;

    /// Users matching `filter`, ordered by id.
    async fn find_users(&mut self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError>;

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, RepositoryError>;

    /// Persist `name`, `email`, `password_hash`, `role` and `shops`.
    ///
    /// The order list is left alone; it only changes through
    /// [`link_user_order`](Self::link_user_order) and
    /// [`unlink_user_order`](Self::unlink_user_order).
    async fn update_user(&mut self, user: &User) -> Result<User, RepositoryError>;

    async fn delete_user(&mut self, id: UserId) -> Result<(), RepositoryError>;

    /// Every shop assigned to at least one user, sorted.
    async fn distinct_shops(&mut self) -> Result<Vec<ShopId>, RepositoryError>;

    async fn link_user_order(&mut self, user: UserId, order: OrderId)
    -> Result<(), RepositoryError>;

    async fn unlink_user_order(
        &mut self,
        user: UserId,
        order: OrderId,
    ) -> Result<(), RepositoryError>;

    // ---------------------------------------------------------------------
    // Customers
    // ---------------------------------------------------------------------

    async fn find_customer(&mut self, id: CustomerId)
    -> Result<Option<Customer>, RepositoryError>;

    /// Customers matching `filter`, ordered by id.
    async fn find_customers(
        &mut self,
        filter: &CustomerFilter,
    ) -> Result<Vec<Customer>, RepositoryError>;

    /// Insert the customer, or if the phone is taken overwrite that
    /// customer's name (and measurements, when supplied).
    ///
    /// A single atomic step: concurrent upserts of one phone both succeed
    /// and end up on the same customer.
    async fn upsert_customer(&mut self, customer: &NewCustomer)
    -> Result<Customer, RepositoryError>;

    async fn link_customer_order(
        &mut self,
        customer: CustomerId,
        order: OrderId,
    ) -> Result<(), RepositoryError>;

    async fn unlink_customer_order(
        &mut self,
        customer: CustomerId,
        order: OrderId,
    ) -> Result<(), RepositoryError>;

    // ---------------------------------------------------------------------
    // Orders
    // ---------------------------------------------------------------------

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders matching `filter`, ordered by id.
    async fn find_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError>;

    /// The subset of `keys` already taken by an existing order.
    async fn find_existing_keys(
        &mut self,
        keys: &[OrderKey],
    ) -> Result<Vec<OrderKey>, RepositoryError>;

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError>;

    /// Persist every field except `id`, `customer_id` and `creator_id`.
    async fn update_order(&mut self, order: &Order) -> Result<Order, RepositoryError>;

    async fn delete_order(&mut self, id: OrderId) -> Result<(), RepositoryError>;

    // ---------------------------------------------------------------------
    // Transaction control
    // ---------------------------------------------------------------------

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError>;

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError>;
}
