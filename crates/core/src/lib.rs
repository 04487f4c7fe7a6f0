//! Atelier Core - Shared domain types.
//!
//! This crate provides the types shared by every Atelier component:
//! - `server` - Order lifecycle, authorization and JSON API
//! - `cli` - Migrations and user provisioning
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database access,
//! no HTTP. The order status state machine lives here so that every layer agrees
//! on which transitions are legal.
//!
//! # Modules
//!
//! - [`types`] - Typed ids, shops, contact details, roles, order status, garments

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
