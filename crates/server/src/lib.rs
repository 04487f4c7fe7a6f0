//! Atelier server library.
//!
//! Order lifecycle and role-scoped authorization for a multi-shop tailoring
//! business, exposed as a JSON API. Built as a library so the services and
//! the router can be driven from tests over the in-memory store.
//!
//! # Layers
//!
//! - [`routes`] - axum handlers, one per API operation
//! - [`middleware`] - bearer-token identity extractor
//! - [`services`] - policy, lifecycle, queries, directory, credentials
//! - [`db`] - the [`db::EntityStore`] seam with `PostgreSQL` and in-memory backends
//! - [`models`] - domain types and request bodies

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::router;
pub use state::AppState;
