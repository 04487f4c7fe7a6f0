//! `PostgreSQL` store.
//!
//! Queries are built at runtime (`query_as` / `QueryBuilder`) so the crate
//! builds without a live database. Back-reference lists are `INTEGER[]`
//! columns updated with `array_append` / `array_remove`, so concurrent
//! lifecycle operations touching the same customer or creator never lose an
//! update.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use atelier_core::{
    CustomerId, Email, Measurements, OrderId, OrderStatus, PhoneNumber, Product, Role, ShopId,
    UserId,
};

use super::RepositoryError;
use super::store::{EntityStore, StoreTransaction};
use crate::models::{
    Customer, CustomerFilter, NewCustomer, NewOrder, NewUser, Order, OrderDates, OrderFilter,
    OrderKey, User, UserFilter,
};

const USER_COLUMNS: &str =
    "id, name, username, email, password_hash, role, shops, orders, created_at";
const CUSTOMER_COLUMNS: &str = "id, name, phone, orders, measurements";
const ORDER_COLUMNS: &str = "id, order_number, shop, order_date, trial_date, delivery_date, \
     completion_date, cancelled_date, customer_id, creator_id, products, status, bill, measurements";

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    name: String,
    username: String,
    email: String,
    password_hash: String,
    role: Role,
    shops: Vec<String>,
    orders: Vec<i32>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            name: row.name,
            username: row.username,
            email,
            password_hash: row.password_hash,
            role: row.role,
            shops: parse_shops(&row.shops)?.into_iter().collect(),
            orders: row.orders.into_iter().map(OrderId::new).collect(),
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: i32,
    name: String,
    phone: String,
    orders: Vec<i32>,
    measurements: Json<Measurements>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = RepositoryError;

    fn try_from(row: CustomerRow) -> Result<Self, Self::Error> {
        let phone = PhoneNumber::parse(&row.phone).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid phone in database: {e}"))
        })?;

        Ok(Self {
            id: CustomerId::new(row.id),
            name: row.name,
            phone,
            orders: row.orders.into_iter().map(OrderId::new).collect(),
            measurements: row.measurements.0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i32,
    order_number: String,
    shop: String,
    order_date: NaiveDate,
    trial_date: NaiveDate,
    delivery_date: NaiveDate,
    completion_date: Option<NaiveDate>,
    cancelled_date: Option<NaiveDate>,
    customer_id: i32,
    creator_id: i32,
    products: Json<Vec<Product>>,
    status: OrderStatus,
    bill: Option<String>,
    measurements: Json<Measurements>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::new(row.id),
            order_number: row.order_number,
            shop: parse_shop(&row.shop)?,
            dates: OrderDates {
                order: row.order_date,
                trial: row.trial_date,
                delivery: row.delivery_date,
                completion: row.completion_date,
                cancelled: row.cancelled_date,
            },
            customer_id: CustomerId::new(row.customer_id),
            creator_id: UserId::new(row.creator_id),
            products: row.products.0,
            status: row.status,
            bill: row.bill,
            measurements: row.measurements.0,
        })
    }
}

fn parse_shop(shop: &str) -> Result<ShopId, RepositoryError> {
    ShopId::parse(shop)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid shop in database: {e}")))
}

fn parse_shops(shops: &[String]) -> Result<Vec<ShopId>, RepositoryError> {
    shops.iter().map(|s| parse_shop(s)).collect()
}

fn shop_strings(shops: &BTreeSet<ShopId>) -> Vec<String> {
    shops.iter().map(|s| s.as_str().to_owned()).collect()
}

/// `ILIKE` pattern matching `term` literally anywhere in the value.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Map unique and foreign-key violations to `Conflict`.
fn map_constraint(e: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation() || db_err.is_foreign_key_violation())
    {
        let constraint = db_err.constraint().unwrap_or("unknown");
        return RepositoryError::Conflict(format!("{what} ({constraint})"));
    }
    RepositoryError::Database(e)
}

fn affected(rows: u64) -> Result<(), RepositoryError> {
    if rows == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}

// =============================================================================
// Store
// =============================================================================

/// Store backed by a `PostgreSQL` pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn find_user(&mut self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_user_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_user_by_email(&mut self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_users(&mut self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {USER_COLUMNS} FROM users WHERE TRUE"
        ));
        if let Some(ids) = &filter.ids {
            let ids: Vec<i32> = ids.iter().map(UserId::as_i32).collect();
            qb.push(" AND id = ANY(").push_bind(ids).push(")");
        }
        if let Some(shops) = &filter.sharing_shops {
            qb.push(" AND shops && ").push_bind(shop_strings(shops));
        }
        if let Some(role) = filter.exclude_role {
            qb.push(" AND role <> ").push_bind(role);
        }
        if let Some(name) = &filter.name_contains {
            qb.push(" AND name ILIKE ").push_bind(like_pattern(name));
        }
        qb.push(" ORDER BY id");

        let rows = qb
            .build_query_as::<UserRow>()
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_user(&mut self, user: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (name, username, email, password_hash, role, shops) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.name)
        .bind(&user.username)
        .bind(user.email.as_str())
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(shop_strings(&user.shops))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_constraint(e, "username or email already exists"))?;

        row.try_into()
    }

    async fn update_user(&mut self, user: &User) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET name = $2, email = $3, password_hash = $4, role = $5, shops = $6, \
             updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id.as_i32())
        .bind(&user.name)
        .bind(user.email.as_str())
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(shop_strings(&user.shops))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_constraint(e, "email already exists"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn delete_user(&mut self, id: UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.as_i32())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_constraint(e, "user is still the creator of orders"))?;
        affected(result.rows_affected())
    }

    async fn distinct_shops(&mut self) -> Result<Vec<ShopId>, RepositoryError> {
        let shops = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT unnest(shops) AS shop FROM users ORDER BY shop",
        )
        .fetch_all(&mut *self.tx)
        .await?;
        parse_shops(&shops)
    }

    async fn link_user_order(
        &mut self,
        user: UserId,
        order: OrderId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET orders = array_append(orders, $2) WHERE id = $1")
            .bind(user.as_i32())
            .bind(order.as_i32())
            .execute(&mut *self.tx)
            .await?;
        affected(result.rows_affected())
    }

    async fn unlink_user_order(
        &mut self,
        user: UserId,
        order: OrderId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE users SET orders = array_remove(orders, $2) WHERE id = $1")
            .bind(user.as_i32())
            .bind(order.as_i32())
            .execute(&mut *self.tx)
            .await?;
        affected(result.rows_affected())
    }

    async fn find_customer(
        &mut self,
        id: CustomerId,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_customers(
        &mut self,
        filter: &CustomerFilter,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE TRUE"
        ));
        if let Some(ids) = &filter.ids {
            let ids: Vec<i32> = ids.iter().map(CustomerId::as_i32).collect();
            qb.push(" AND id = ANY(").push_bind(ids).push(")");
        }
        if let Some(term) = &filter.term {
            let pattern = like_pattern(term);
            qb.push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR phone ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(shops) = &filter.ordered_in {
            qb.push(
                " AND EXISTS (SELECT 1 FROM orders o WHERE o.customer_id = customers.id \
                 AND o.shop = ANY(",
            )
            .push_bind(shop_strings(shops))
            .push("))");
        }
        qb.push(" ORDER BY id");

        let rows = qb
            .build_query_as::<CustomerRow>()
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn upsert_customer(
        &mut self,
        customer: &NewCustomer,
    ) -> Result<Customer, RepositoryError> {
        // ON CONFLICT waits for a concurrent insert of the same phone and then
        // updates that row, so two new orders for one new customer both land.
        let row = sqlx::query_as::<_, CustomerRow>(&format!(
            "INSERT INTO customers (name, phone, measurements) \
             VALUES ($1, $2, COALESCE($3, '{{}}'::jsonb)) \
             ON CONFLICT (phone) DO UPDATE SET name = EXCLUDED.name, \
             measurements = COALESCE($3, customers.measurements), updated_at = NOW() \
             RETURNING {CUSTOMER_COLUMNS}"
        ))
        .bind(&customer.name)
        .bind(customer.phone.as_str())
        .bind(customer.measurements.as_ref().map(Json))
        .fetch_one(&mut *self.tx)
        .await?;

        row.try_into()
    }

    async fn link_customer_order(
        &mut self,
        customer: CustomerId,
        order: OrderId,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE customers SET orders = array_append(orders, $2) WHERE id = $1")
                .bind(customer.as_i32())
                .bind(order.as_i32())
                .execute(&mut *self.tx)
                .await?;
        affected(result.rows_affected())
    }

    async fn unlink_customer_order(
        &mut self,
        customer: CustomerId,
        order: OrderId,
    ) -> Result<(), RepositoryError> {
        let result =
            sqlx::query("UPDATE customers SET orders = array_remove(orders, $2) WHERE id = $1")
                .bind(customer.as_i32())
                .bind(order.as_i32())
                .execute(&mut *self.tx)
                .await?;
        affected(result.rows_affected())
    }

    async fn find_order(&mut self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"
        ));
        if let Some(ids) = &filter.ids {
            let ids: Vec<i32> = ids.iter().map(OrderId::as_i32).collect();
            qb.push(" AND id = ANY(").push_bind(ids).push(")");
        }
        if let Some(shops) = &filter.shops {
            qb.push(" AND shop = ANY(")
                .push_bind(shop_strings(shops))
                .push(")");
        }
        if let Some(creator) = filter.creator {
            qb.push(" AND creator_id = ").push_bind(creator.as_i32());
        }
        if let Some(customers) = &filter.customers {
            let ids: Vec<i32> = customers.iter().map(CustomerId::as_i32).collect();
            qb.push(" AND customer_id = ANY(").push_bind(ids).push(")");
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status);
        }
        if let Some(from) = filter.ordered_from {
            qb.push(" AND order_date >= ").push_bind(from);
        }
        if let Some(to) = filter.ordered_to {
            qb.push(" AND order_date <= ").push_bind(to);
        }
        if let Some(day) = filter.trial_on {
            qb.push(" AND trial_date = ").push_bind(day);
        }
        if let Some(day) = filter.delivery_on {
            qb.push(" AND delivery_date = ").push_bind(day);
        }
        if let Some(text) = &filter.text {
            let pattern = like_pattern(text);
            qb.push(" AND (order_number ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR bill ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY id");

        let rows = qb
            .build_query_as::<OrderRow>()
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_existing_keys(
        &mut self,
        keys: &[OrderKey],
    ) -> Result<Vec<OrderKey>, RepositoryError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let shops: Vec<String> = keys.iter().map(|k| k.shop.as_str().to_owned()).collect();
        let numbers: Vec<String> = keys.iter().map(|k| k.order_number.clone()).collect();

        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT shop, order_number FROM orders \
             WHERE (shop, order_number) IN (SELECT * FROM UNNEST($1::TEXT[], $2::TEXT[])) \
             ORDER BY shop, order_number",
        )
        .bind(shops)
        .bind(numbers)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter()
            .map(|(shop, order_number)| {
                Ok(OrderKey {
                    shop: parse_shop(&shop)?,
                    order_number,
                })
            })
            .collect()
    }

    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO orders (order_number, shop, order_date, trial_date, delivery_date, \
             completion_date, cancelled_date, customer_id, creator_id, products, status, bill, \
             measurements) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order.key.order_number)
        .bind(order.key.shop.as_str())
        .bind(order.dates.order)
        .bind(order.dates.trial)
        .bind(order.dates.delivery)
        .bind(order.dates.completion)
        .bind(order.dates.cancelled)
        .bind(order.customer_id.as_i32())
        .bind(order.creator_id.as_i32())
        .bind(Json(&order.products))
        .bind(order.status)
        .bind(order.bill.as_deref())
        .bind(Json(&order.measurements))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_constraint(e, &format!("order {} already exists", order.key)))?;

        row.try_into()
    }

    async fn update_order(&mut self, order: &Order) -> Result<Order, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET order_number = $2, shop = $3, order_date = $4, trial_date = $5, \
             delivery_date = $6, completion_date = $7, cancelled_date = $8, products = $9, \
             status = $10, bill = $11, measurements = $12, updated_at = NOW() \
             WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(order.id.as_i32())
        .bind(&order.order_number)
        .bind(order.shop.as_str())
        .bind(order.dates.order)
        .bind(order.dates.trial)
        .bind(order.dates.delivery)
        .bind(order.dates.completion)
        .bind(order.dates.cancelled)
        .bind(Json(&order.products))
        .bind(order.status)
        .bind(order.bill.as_deref())
        .bind(Json(&order.measurements))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_constraint(e, &format!("order {} already exists", order.key())))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_i32())
            .execute(&mut *self.tx)
            .await?;
        affected(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { tx } = *self;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepositoryError> {
        let Self { tx } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
