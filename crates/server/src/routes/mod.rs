//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                   - Liveness
//! GET    /health/ready             - Store readiness
//!
//! # Auth
//! POST   /auth/login               - Exchange username/password for a token
//!
//! # Users
//! GET    /users                    - Scoped list
//! POST   /users                    - Create
//! GET    /users/me                 - Current user with their orders
//! GET    /users/shops              - Shops visible to the caller
//! GET    /users/search/{name}      - Scoped name search
//! GET    /users/{id}               - Scoped get
//! PUT    /users/{id}               - Update name/email
//! DELETE /users/{id}               - Delete (Admin only)
//! PUT    /users/{id}/password      - Reset password
//! PUT    /users/{id}/access        - Set role/shops (Admin only)
//!
//! # Orders
//! GET    /orders                   - Scoped list with query-string filters
//! POST   /orders                   - Create
//! POST   /orders/bulk              - Create many, all or nothing
//! GET    /orders/search/{term}     - Search by number, bill, customer name/phone
//! GET    /orders/{id}              - Scoped get
//! PUT    /orders/{id}              - Update editable fields
//! DELETE /orders/{id}              - Delete
//! PUT    /orders/{id}/status       - Status transition
//!
//! # Customers
//! GET    /customers                - Scoped list
//! GET    /customers/search/{term}  - Scoped search
//! GET    /customers/{id}           - Scoped get with orders
//! ```

pub mod auth;
pub mod customers;
pub mod orders;
pub mod users;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Build the application router with state applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        // Auth
        .route("/auth/login", post(auth::login))
        // Users
        .route("/users", get(users::list).post(users::create))
        .route("/users/me", get(users::me))
        .route("/users/shops", get(users::shops))
        .route("/users/search/{name}", get(users::search))
        .route(
            "/users/{id}",
            get(users::show).put(users::update).delete(users::delete),
        )
        .route("/users/{id}/password", put(users::reset_password))
        .route("/users/{id}/access", put(users::change_access))
        // Orders
        .route("/orders", get(orders::list).post(orders::create))
        .route("/orders/bulk", post(orders::bulk_create))
        .route("/orders/search/{term}", get(orders::search))
        .route(
            "/orders/{id}",
            get(orders::show).put(orders::update).delete(orders::delete),
        )
        .route("/orders/{id}/status", put(orders::update_status))
        // Customers
        .route("/customers", get(customers::list))
        .route("/customers/search/{term}", get(customers::search))
        .route("/customers/{id}", get(customers::show))
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
