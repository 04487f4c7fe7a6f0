//! Service error taxonomy.

use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::OrderKey;

/// What went wrong, independent of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Missing or malformed input. Never worth retrying as-is.
    ValidationError,
    NotFound,
    /// Authenticated, but not permitted.
    Unauthorized,
    /// Missing or invalid credential.
    Unauthenticated,
    /// A uniqueness rule would be broken.
    Conflict,
    /// The store aborted. Nothing was written, so the whole operation may be retried.
    TransactionFailure,
    /// A fault on the server's side outside the store, such as a failed token signature.
    Internal,
}

/// Errors returned by every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("conflict: {message}")]
    Conflict {
        message: String,
        /// Order keys that collided, when the conflict is about orders.
        keys: Vec<OrderKey>,
    },

    #[error("transaction failed: {0}")]
    TransactionFailure(RepositoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::TransactionFailure(_) => ErrorKind::TransactionFailure,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            keys: Vec::new(),
        }
    }

    pub(crate) fn order_conflict(keys: Vec<OrderKey>) -> Self {
        let listed = keys
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        Self::Conflict {
            message: format!("order number already used in shop: {listed}"),
            keys,
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("record"),
            RepositoryError::Conflict(message) => Self::conflict(message),
            other => Self::TransactionFailure(other),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::ShopId;

    use super::*;

    #[test]
    fn test_repository_errors_map_to_kinds() {
        assert_eq!(
            ServiceError::from(RepositoryError::NotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ServiceError::from(RepositoryError::Conflict("dup".into())).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::from(RepositoryError::DataCorruption("bad".into())).kind(),
            ErrorKind::TransactionFailure
        );
    }

    #[test]
    fn test_order_conflict_lists_keys() {
        let keys = vec![OrderKey {
            shop: ShopId::parse("S1").unwrap(),
            order_number: "O-2".to_owned(),
        }];
        let err = ServiceError::order_conflict(keys);
        assert_eq!(err.to_string(), "conflict: order number already used in shop: S1/O-2");
    }
}
