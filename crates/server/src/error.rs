//! Unified error handling for the HTTP layer.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::OrderKey;
use crate::services::{ErrorKind, ServiceError};

/// Application-level error type returned by every handler.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The request body, path or query string could not be read.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "<[OrderKey]>::is_empty")]
    conflicts: Vec<OrderKey>,
}

impl AppError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Service(err) => err.kind(),
            Self::BadRequest(_) => ErrorKind::ValidationError,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();

        // Log server-side failures with Sentry
        if matches!(kind, ErrorKind::TransactionFailure | ErrorKind::Internal) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request failed on the server"
            );
        }

        let status = match kind {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::TransactionFailure => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Don't expose store error details to clients
        let (message, conflicts) = match self {
            Self::Service(ServiceError::TransactionFailure(_)) => (
                "The operation could not be completed; nothing was changed. Please retry."
                    .to_string(),
                Vec::new(),
            ),
            Self::Service(ServiceError::Internal(_)) => {
                ("Internal server error".to_string(), Vec::new())
            }
            Self::Service(ServiceError::Conflict { message, keys }) => (message, keys),
            other => (other.to_string(), Vec::new()),
        };

        let body = ErrorBody {
            error: kind,
            message,
            conflicts,
        };
        (status, Json(body)).into_response()
    }
}

/// JSON body extractor whose rejections are reported as [`AppError::BadRequest`].
///
/// Unknown fields in bodies that forbid them surface here as a validation error.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

/// Path extractor whose rejections are reported as [`AppError::BadRequest`],
/// e.g. a non-numeric id in `/orders/{id}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathParam<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

/// Query string extractor whose rejections are reported as [`AppError::BadRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<T>(pub T);

impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}

/// Set the Sentry user context for the authenticated caller.
pub fn set_sentry_user(user_id: i32) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
