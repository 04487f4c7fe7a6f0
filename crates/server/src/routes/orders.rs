//! Order route handlers.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use tracing::instrument;

use atelier_core::OrderId;

use crate::{
    error::{AppError, JsonBody, PathParam, QueryParams},
    middleware::Authenticated,
    models::{OrderDetails, OrderDraft, OrderPatch, OrderQuery, StatusChange},
    state::AppState,
};

/// `GET /orders`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn list(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    QueryParams(query): QueryParams<OrderQuery>,
) -> Result<Json<Vec<OrderDetails>>, AppError> {
    Ok(Json(state.queries().list_orders(&identity, query).await?))
}

/// `GET /orders/search/{term}`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn search(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(term): PathParam<String>,
) -> Result<Json<Vec<OrderDetails>>, AppError> {
    Ok(Json(state.queries().search_orders(&identity, &term).await?))
}

/// `GET /orders/{id}`
#[instrument(skip_all, fields(user_id = %identity.user_id, order_id = %id))]
pub async fn show(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<OrderId>,
) -> Result<Json<OrderDetails>, AppError> {
    Ok(Json(state.queries().get_order(&identity, id).await?))
}

/// `POST /orders`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn create(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    JsonBody(draft): JsonBody<OrderDraft>,
) -> Result<(StatusCode, Json<OrderDetails>), AppError> {
    let details = state.orders().create(&identity, draft).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

/// `POST /orders/bulk`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn bulk_create(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    JsonBody(drafts): JsonBody<Vec<OrderDraft>>,
) -> Result<(StatusCode, Json<Vec<OrderDetails>>), AppError> {
    let created = state.orders().bulk_create(&identity, drafts).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /orders/{id}`
#[instrument(skip_all, fields(user_id = %identity.user_id, order_id = %id))]
pub async fn update(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<OrderId>,
    JsonBody(patch): JsonBody<OrderPatch>,
) -> Result<Json<OrderDetails>, AppError> {
    Ok(Json(state.orders().update_fields(&identity, id, patch).await?))
}

/// `PUT /orders/{id}/status`
#[instrument(skip_all, fields(user_id = %identity.user_id, order_id = %id))]
pub async fn update_status(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<OrderId>,
    JsonBody(change): JsonBody<StatusChange>,
) -> Result<Json<OrderDetails>, AppError> {
    Ok(Json(state.orders().update_status(&identity, id, change).await?))
}

/// `DELETE /orders/{id}`
#[instrument(skip_all, fields(user_id = %identity.user_id, order_id = %id))]
pub async fn delete(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<OrderId>,
) -> Result<StatusCode, AppError> {
    state.orders().delete(&identity, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
