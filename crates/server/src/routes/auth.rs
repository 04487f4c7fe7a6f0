//! Login route handler.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::{
    error::{AppError, JsonBody},
    models::{LoginRequest, LoginResponse},
    state::AppState,
};

/// `POST /auth/login`
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    Ok(Json(state.directory().login(request).await?))
}
