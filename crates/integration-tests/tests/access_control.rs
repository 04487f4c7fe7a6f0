//! Integration tests for role and shop scoping.

#![allow(clippy::unwrap_used)]

use atelier_core::{Email, Role};
use atelier_integration_tests::{TestContext, draft, shop_set};
use atelier_server::models::{
    AccessChangeRequest, CreateUserRequest, OrderPatch, OrderQuery, UpdateUserRequest,
};
use atelier_server::services::{
    CredentialService, DirectoryService, ErrorKind, OrderService, QueryService,
};
use chrono::Duration;
use secrecy::SecretString;

fn credentials() -> CredentialService {
    CredentialService::new(
        &SecretString::from("integration-test-secret-0123456789abcdef"),
        Duration::hours(1),
    )
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
async fn test_user_cannot_create_outside_their_shops() {
    let ctx = TestContext::new();
    let user = ctx.seed(Role::User, &["S1"]).await;

    let err = OrderService::new(&ctx.store)
        .create(&user, draft("O-1", "S2", "555-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert!(ctx.snapshot().await.customers.is_empty());
}

#[tokio::test]
async fn test_user_mutates_only_their_own_orders() {
    let ctx = TestContext::new();
    let author = ctx.seed(Role::User, &["S1"]).await;
    let colleague = ctx.seed(Role::User, &["S1"]).await;
    let manager = ctx.seed(Role::Manager, &["S1"]).await;
    let orders = OrderService::new(&ctx.store);
    let queries = QueryService::new(&ctx.store);

    let id = orders
        .create(&author, draft("O-1", "S1", "555-1"))
        .await
        .unwrap()
        .order
        .id;

    // Colleague can read but not change
    queries.get_order(&colleague, id).await.unwrap();
    let patch: OrderPatch = serde_json::from_value(serde_json::json!({"bill": "B"})).unwrap();
    let err = orders
        .update_fields(&colleague, id, patch.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    let err = orders.delete(&colleague, id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    // A manager of the shop can
    orders.update_fields(&manager, id, patch).await.unwrap();
    orders.delete(&manager, id).await.unwrap();
}

#[tokio::test]
async fn test_manager_lists_only_their_shops() {
    let ctx = TestContext::new();
    let admin = ctx.seed(Role::Admin, &[]).await;
    let manager = ctx.seed(Role::Manager, &["S1", "S2"]).await;
    let orders = OrderService::new(&ctx.store);
    let queries = QueryService::new(&ctx.store);

    orders.create(&admin, draft("O-1", "S1", "555-1")).await.unwrap();
    orders.create(&admin, draft("O-2", "S2", "555-2")).await.unwrap();
    let hidden = orders.create(&admin, draft("O-3", "S3", "555-3")).await.unwrap();

    let listed = queries
        .list_orders(&manager, OrderQuery::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|d| d.order.shop.as_str() != "S3"));
    assert_eq!(
        queries.list_orders(&admin, OrderQuery::default()).await.unwrap().len(),
        3
    );

    // Existence is not hidden, access is refused
    let err = queries.get_order(&manager, hidden.order.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    // Asking for a shop outside scope is refused rather than silently emptied
    let err = queries
        .list_orders(
            &manager,
            OrderQuery {
                shop: Some(atelier_core::ShopId::parse("S3").unwrap()),
                ..OrderQuery::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    // Search results are intersected with scope
    let found = queries.search_orders(&manager, "O-").await.unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn test_moving_an_order_requires_both_shops() {
    let ctx = TestContext::new();
    let manager = ctx.seed(Role::Manager, &["S1"]).await;
    let orders = OrderService::new(&ctx.store);
    let id = orders
        .create(&manager, draft("O-1", "S1", "555-1"))
        .await
        .unwrap()
        .order
        .id;

    let patch: OrderPatch = serde_json::from_value(serde_json::json!({"shop": "S9"})).unwrap();
    let err = orders.update_fields(&manager, id, patch).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    assert_eq!(ctx.snapshot().await.orders[0].shop.as_str(), "S1");
}

// ============================================================================
// Customers
// ============================================================================

#[tokio::test]
async fn test_customer_visibility_follows_their_orders() {
    let ctx = TestContext::new();
    let admin = ctx.seed(Role::Admin, &[]).await;
    let manager = ctx.seed(Role::Manager, &["S1"]).await;
    let user = ctx.seed(Role::User, &["S1"]).await;
    let orders = OrderService::new(&ctx.store);
    let queries = QueryService::new(&ctx.store);

    let shared = orders.create(&admin, draft("O-1", "S1", "555-1")).await.unwrap();
    orders.create(&admin, draft("O-2", "S2", "555-1")).await.unwrap();
    let elsewhere = orders.create(&admin, draft("O-3", "S2", "555-9")).await.unwrap();

    let listed = queries.list_customers(&manager).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(queries.list_customers(&admin).await.unwrap().len(), 2);

    let profile = queries
        .get_customer(&manager, shared.customer.id)
        .await
        .unwrap();
    assert_eq!(profile.customer.orders, vec![shared.order.id]);
    assert_eq!(profile.order_details.len(), 1);

    let err = queries
        .get_customer(&manager, elsewhere.customer.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = queries.list_customers(&user).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_manager_user_administration() {
    let ctx = TestContext::new();
    let credentials = credentials();
    let manager = ctx.seed(Role::Manager, &["S1", "S2"]).await;
    let directory = DirectoryService::new(&ctx.store, &credentials);

    let staff = directory
        .create(
            &manager,
            CreateUserRequest {
                name: "Nila Das".to_owned(),
                email: Email::parse("nila@atelier.test").unwrap(),
                password: "needle-and-thread".to_owned(),
                role: Role::User,
                shops: shop_set(&["S2"]),
            },
        )
        .await
        .unwrap();
    assert_eq!(staff.username, "niladas");

    let err = directory
        .create(
            &manager,
            CreateUserRequest {
                name: "Outsider".to_owned(),
                email: Email::parse("out@atelier.test").unwrap(),
                password: "needle-and-thread".to_owned(),
                role: Role::User,
                shops: shop_set(&["S3"]),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    directory
        .update(
            &manager,
            staff.id,
            UpdateUserRequest {
                name: Some("Nila D".to_owned()),
                email: None,
            },
        )
        .await
        .unwrap();

    let err = directory
        .change_access(
            &manager,
            staff.id,
            AccessChangeRequest {
                role: Role::Manager,
                shops: shop_set(&["S2"]),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let err = directory.delete(&manager, staff.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_admin_access_changes_and_delete_rules() {
    let ctx = TestContext::new();
    let credentials = credentials();
    let admin = ctx.seed(Role::Admin, &[]).await;
    let user = ctx.seed(Role::User, &["S1"]).await;
    let directory = DirectoryService::new(&ctx.store, &credentials);

    // Admins carry no shops, everyone else needs at least one
    let err = directory
        .change_access(
            &admin,
            user.user_id,
            AccessChangeRequest {
                role: Role::Admin,
                shops: shop_set(&["S1"]),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    let promoted = directory
        .change_access(
            &admin,
            user.user_id,
            AccessChangeRequest {
                role: Role::Manager,
                shops: shop_set(&["S1", "S4"]),
            },
        )
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Manager);

    // A user who created orders cannot be deleted
    OrderService::new(&ctx.store)
        .create(&user, draft("O-1", "S1", "555-1"))
        .await
        .unwrap();
    let err = directory.delete(&admin, user.user_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = directory.delete(&admin, admin.user_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    let shops = directory.shops(&admin).await.unwrap();
    let shops: Vec<_> = shops.iter().map(atelier_core::ShopId::as_str).collect();
    assert_eq!(shops, vec!["S1", "S4"]);
}

#[tokio::test]
async fn test_user_sees_only_themselves() {
    let ctx = TestContext::new();
    let credentials = credentials();
    let user = ctx.seed(Role::User, &["S1"]).await;
    let colleague = ctx.seed(Role::User, &["S1"]).await;
    let directory = DirectoryService::new(&ctx.store, &credentials);

    directory.get(&user, user.user_id).await.unwrap();
    let err = directory.get(&user, colleague.user_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    let err = directory.list(&user).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}
