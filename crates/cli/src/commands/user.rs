//! User bootstrap command.
//!
//! Creates users directly in the database. This is how the first Admin comes
//! to exist, since creating users over the API requires one.
//!
//! # Usage
//!
//! ```bash
//! ATELIER_USER_PASSWORD=... atelier user create -n "Asha Rao" -e asha@atelier.test -r admin
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use atelier_core::{Email, Role, ShopId};
use atelier_server::db::{self, EntityStore, PgStore};
use atelier_server::models::CreateUserRequest;
use atelier_server::services::{ServiceError, directory};

/// Errors that can occur while creating a user.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid role: {0}. Valid roles: admin, manager, user")]
    InvalidRole(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid shop: {0}")]
    InvalidShop(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Arguments for [`create`].
#[derive(Debug)]
pub struct NewUserArgs {
    pub name: String,
    pub email: String,
    pub role: String,
    pub shops: Vec<String>,
    pub password: String,
}

/// Create a user and log the derived username.
pub async fn create(args: NewUserArgs) -> Result<(), UserError> {
    let request = parse(args)?;

    let database_url =
        super::database_url().ok_or(UserError::MissingEnvVar("ATELIER_DATABASE_URL"))?;
    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&database_url).await?;
    let store: Arc<dyn EntityStore> = Arc::new(PgStore::new(pool));

    tracing::info!("Creating {} user: {}", request.role, request.email);
    let user = directory::provision(store.as_ref(), request).await?;

    tracing::info!(
        "User created successfully! ID: {}, Username: {}, Role: {}",
        user.id,
        user.username,
        user.role
    );
    Ok(())
}

fn parse(args: NewUserArgs) -> Result<CreateUserRequest, UserError> {
    let role: Role = args
        .role
        .parse()
        .map_err(|_| UserError::InvalidRole(args.role.clone()))?;
    let email = Email::parse(&args.email).map_err(|e| UserError::InvalidEmail(e.to_string()))?;
    let shops = args
        .shops
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| ShopId::parse(s).map_err(|e| UserError::InvalidShop(e.to_string())))
        .collect::<Result<BTreeSet<_>, _>>()?;

    Ok(CreateUserRequest {
        name: args.name,
        email,
        password: args.password,
        role,
        shops,
    })
}
