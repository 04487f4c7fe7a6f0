//! Business logic services.
//!
//! # Services
//!
//! - `credentials` - Argon2 password hashing and JWT identity tokens
//! - `policy` - Role-scoped authorization decisions
//! - `lifecycle` - Order create/update/delete kept consistent with customers and creators
//! - `queries` - Scoped listing and search of orders and customers
//! - `directory` - Login and user management
//!
//! Every operation takes the caller's [`Identity`] and returns
//! `Result<T, ServiceError>`. Work happens inside one store transaction which
//! is committed on success and rolled back on any error.

pub mod credentials;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod policy;
pub mod queries;

pub use credentials::{CredentialError, CredentialService, Identity};
pub use directory::DirectoryService;
pub use error::{ErrorKind, ServiceError};
pub use lifecycle::OrderService;
pub use policy::{Action, Decision, Scope, authorize};
pub use queries::QueryService;

use crate::db::StoreTransaction;

/// Commit `tx` if `result` is a success, otherwise roll it back.
///
/// A failed rollback is logged and the original error is returned.
pub(crate) async fn settle<T>(
    tx: Box<dyn StoreTransaction>,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Failed to roll back transaction");
            }
            Err(err)
        }
    }
}
