//! Customer route handlers.

use axum::{
    Json,
    extract::State,
};
use tracing::instrument;

use atelier_core::CustomerId;

use crate::{
    error::{AppError, PathParam},
    middleware::Authenticated,
    models::{Customer, CustomerProfile},
    state::AppState,
};

/// `GET /customers`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn list(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<Customer>>, AppError> {
    Ok(Json(state.queries().list_customers(&identity).await?))
}

/// `GET /customers/search/{term}`
#[instrument(skip_all, fields(user_id = %identity.user_id))]
pub async fn search(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(term): PathParam<String>,
) -> Result<Json<Vec<Customer>>, AppError> {
    Ok(Json(state.queries().search_customers(&identity, &term).await?))
}

/// `GET /customers/{id}`
#[instrument(skip_all, fields(user_id = %identity.user_id, customer_id = %id))]
pub async fn show(
    Authenticated(identity): Authenticated,
    State(state): State<AppState>,
    PathParam(id): PathParam<CustomerId>,
) -> Result<Json<CustomerProfile>, AppError> {
    Ok(Json(state.queries().get_customer(&identity, id).await?))
}
