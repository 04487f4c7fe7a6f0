//! Integration tests for Atelier.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atelier-integration-tests
//! ```
//!
//! The tests drive the services and the axum router over the in-memory
//! store, so no database or running server is needed. The exception is
//! `postgres_store`, whose tests are ignored unless run with `--ignored`
//! against a database named by `ATELIER_DATABASE_URL`.
//!
//! # Test Categories
//!
//! - `order_lifecycle` - Create, update, transition and delete
//! - `atomicity` - Rollback under injected store failures, concurrent writers
//! - `access_control` - Role and shop scoping across every read and write
//! - `http_api` - Status codes and error bodies through the router
//! - `postgres_store` - The same lifecycle against `PostgreSQL`, including concurrent writers

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::Duration;
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use atelier_core::{Email, OrderId, Role, ShopId};
use atelier_server::AppState;
use atelier_server::db::memory::Snapshot;
use atelier_server::db::{EntityStore, MemoryStore};
use atelier_server::models::{NewUser, OrderDraft};
use atelier_server::services::{CredentialService, Identity};

static NEXT_USER: AtomicUsize = AtomicUsize::new(1);

/// Everything a test needs: a shared store, the app state over it, and a way
/// to mint identities and tokens.
pub struct TestContext {
    pub store: MemoryStore,
    pub state: AppState,
}

impl TestContext {
    #[must_use]
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let credentials = CredentialService::new(
            &SecretString::from("integration-test-secret-0123456789abcdef"),
            Duration::hours(1),
        );
        let state = AppState::new(std::sync::Arc::new(store.clone()), credentials);
        Self { store, state }
    }

    /// Insert a user directly, skipping password hashing.
    pub async fn seed(&self, role: Role, shops: &[&str]) -> Identity {
        let n = NEXT_USER.fetch_add(1, Ordering::Relaxed);
        let mut tx = self.store.begin().await.unwrap();
        let user = tx
            .insert_user(&NewUser {
                name: format!("Staff {n}"),
                username: format!("staff{n}"),
                email: Email::parse(&format!("staff{n}@atelier.test")).unwrap(),
                password_hash: "unused".to_owned(),
                role,
                shops: shop_set(shops),
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();
        Identity::from(&user)
    }

    /// A bearer token for `identity`.
    #[must_use]
    pub fn token(&self, identity: &Identity) -> String {
        self.state.credentials().issue(identity).unwrap()
    }

    /// Send a request through the router and return the status and JSON body
    /// (`Value::Null` for an empty body).
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = atelier_server::router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Committed state of the store.
    pub async fn snapshot(&self) -> Snapshot {
        self.store.snapshot().await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[must_use]
pub fn shop_set(shops: &[&str]) -> BTreeSet<ShopId> {
    shops.iter().map(|s| ShopId::parse(s).unwrap()).collect()
}

/// A complete order body.
#[must_use]
pub fn order_json(number: &str, shop: &str, phone: &str) -> Value {
    json!({
        "orderNumber": number,
        "shop": shop,
        "dates": {"order": "2025-03-01", "trial": "2025-03-10", "delivery": "2025-03-20"},
        "customer": {"name": "Alice", "phone": phone},
        "products": [{"type": "Shirt", "quantity": 1}],
        "status": "Pending"
    })
}

#[must_use]
pub fn draft(number: &str, shop: &str, phone: &str) -> OrderDraft {
    serde_json::from_value(order_json(number, shop, phone)).unwrap()
}

/// Assert that every order/customer/user reference in `snapshot` points at
/// something that exists, in both directions.
pub fn assert_linked(snapshot: &Snapshot) {
    let order_ids: BTreeSet<OrderId> = snapshot.orders.iter().map(|o| o.id).collect();

    for order in &snapshot.orders {
        let customer = snapshot
            .customers
            .iter()
            .find(|c| c.id == order.customer_id)
            .unwrap_or_else(|| panic!("order {} has no customer", order.id));
        assert!(customer.orders.contains(&order.id));
        let creator = snapshot
            .users
            .iter()
            .find(|u| u.id == order.creator_id)
            .unwrap_or_else(|| panic!("order {} has no creator", order.id));
        assert!(creator.orders.contains(&order.id));
    }
    for customer in &snapshot.customers {
        assert!(customer.orders.iter().all(|id| order_ids.contains(id)));
    }
    for user in &snapshot.users {
        assert!(user.orders.iter().all(|id| order_ids.contains(id)));
    }
}
