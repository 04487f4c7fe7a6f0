//! User route handlers.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use tracing::instrument;

use atelier_core::{ShopId, UserId};

use crate::{
    error::{AppError, JsonBody, PathParam},
    middleware::Authenticated,
    models::{
        AccessChangeRequest, CreateUserRequest, PasswordResetRequest, UpdateUserRequest,
        UserProfile, UserView,
    },
    state::AppState,
};

/// `GET /users/me`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn me(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(state.directory().me(&identity).await?))
}

/// `GET /users`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn list(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserView>>, AppError> {
    Ok(Json(state.directory().list(&identity).await?))
}

/// `GET /users/shops`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn shops(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<ShopId>>, AppError> {
    Ok(Json(state.directory().shops(&identity).await?))
}

/// `GET /users/search/{name}`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn search(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(name): PathParam<String>,
) -> Result<Json<Vec<UserView>>, AppError> {
    Ok(Json(state.directory().search(&identity, &name).await?))
}

/// `GET /users/{id}`
#[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
pub async fn show(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<UserId>,
) -> Result<Json<UserProfile>, AppError> {
    Ok(Json(state.directory().get(&identity, id).await?))
}

/// `POST /users`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn create(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserView>), AppError> {
    let user = state.directory().create(&identity, request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `PUT /users/{id}`
#[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
pub async fn update(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<UserId>,
    JsonBody(request): JsonBody<UpdateUserRequest>,
) -> Result<Json<UserView>, AppError> {
    Ok(Json(state.directory().update(&identity, id, request).await?))
}

/// `PUT /users/{id}/password`
#[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
pub async fn reset_password(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<UserId>,
    JsonBody(request): JsonBody<PasswordResetRequest>,
) -> Result<StatusCode, AppError> {
    state.directory().reset_password(&identity, id, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /users/{id}/access`
#[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
pub async fn change_access(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<UserId>,
    JsonBody(request): JsonBody<AccessChangeRequest>,
) -> Result<Json<UserView>, AppError> {
    Ok(Json(state.directory().change_access(&identity, id, request).await?))
}

/// `DELETE /users/{id}`
#[instrument(skip_all, fields(user_id = %identity.user_id, target = %id))]
pub async fn delete(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<UserId>,
) -> Result<StatusCode, AppError> {
    state.directory().delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
