//! Core types for Atelier.
//!
//! This module provides type-safe wrappers for the order-management domain.

pub mod contact;
pub mod garment;
pub mod id;
pub mod role;
pub mod shop;
pub mod status;

pub use contact::{Email, EmailError, PhoneError, PhoneNumber};
pub use garment::{Jacket, Measurements, Product, Shirt, Trouser};
pub use id::*;
pub use role::{Role, RoleParseError};
pub use shop::{ShopId, ShopIdError};
pub use status::{DateField, OrderStatus, TransitionError};
