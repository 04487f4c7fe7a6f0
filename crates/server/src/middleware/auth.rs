//! Authentication extractor.
//!
//! Reads the bearer token from the `Authorization` header and decodes it into
//! the caller's [`Identity`]. No store access happens here.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::{AppError, set_sentry_user};
use crate::services::{Identity, ServiceError};
use crate::state::AppState;

/// Extractor that requires a valid token.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(Authenticated(identity): Authenticated) -> String {
///     format!("Hello, user {}!", identity.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| unauthenticated("missing Authorization header"))?
            .to_str()
            .map_err(|_| unauthenticated("malformed Authorization header"))?;

        let token = bearer_token(header).ok_or_else(|| unauthenticated("empty token"))?;
        let identity = state.credentials().decode(token).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            unauthenticated("invalid or expired token")
        })?;

        set_sentry_user(identity.user_id.as_i32());
        Ok(Self(identity))
    }
}

/// Strip an optional `Bearer ` prefix (any case).
fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let token = match header.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if header.eq_ignore_ascii_case("bearer") => "",
        _ => header,
    };
    (!token.is_empty()).then_some(token)
}

fn unauthenticated(reason: &str) -> AppError {
    AppError::Service(ServiceError::Unauthenticated(reason.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("bearer   abc"), Some("abc"));
        assert_eq!(bearer_token("abc.def"), Some("abc.def"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("   "), None);
    }
}
