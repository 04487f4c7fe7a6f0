//! Order lifecycle: create, bulk create, status and field updates, delete.
//!
//! Each operation spans the orders, customers and users tables and runs in a
//! single store transaction, so the back-references held by customers and
//! creators never disagree with the orders that exist.

use std::collections::BTreeSet;

use tracing::instrument;

use atelier_core::OrderId;

use super::credentials::Identity;
use super::error::ServiceError;
use super::policy::{Action, authorize};
use super::queries::{populate, populate_one};
use super::settle;
use crate::db::{EntityStore, RepositoryError, StoreTransaction};
use crate::models::{
    NewCustomer, NewOrder, Order, OrderDetails, OrderDraft, OrderKey, OrderPatch, StatusChange,
    ValidOrder,
};

/// Write-side service for orders.
pub struct OrderService<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    /// Create an order, upserting its customer by phone.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for missing fields, `Unauthorized` for a shop
    /// outside the caller's, and `Conflict` if the order number is taken.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn create(
        &self,
        identity: &Identity,
        draft: OrderDraft,
    ) -> Result<OrderDetails, ServiceError> {
        let order = draft.validate().map_err(ServiceError::Validation)?;
        authorize(identity, Action::CreateOrder(&order.key.shop)).into_result()?;

        let mut tx = self.store.begin().await?;
        let result = create_in(tx.as_mut(), identity, vec![order]).await;
        let mut created = settle(tx, result).await?;

        let details = created.pop().ok_or_else(|| {
            ServiceError::TransactionFailure(RepositoryError::DataCorruption(
                "order insert returned nothing".to_owned(),
            ))
        })?;
        tracing::info!(order_id = %details.order.id, key = %details.order.key(), "Order created");
        Ok(details)
    }

    /// Create several orders in one transaction. Either all are written or none.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty batch or an invalid item, and
    /// `Conflict` listing every key that is taken or repeated in the batch.
    #[instrument(skip_all, fields(user_id = %identity.user_id, count = drafts.len()))]
    pub async fn bulk_create(
        &self,
        identity: &Identity,
        drafts: Vec<OrderDraft>,
    ) -> Result<Vec<OrderDetails>, ServiceError> {
        if drafts.is_empty() {
            return Err(ServiceError::Validation("no orders supplied".to_owned()));
        }

        let orders = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| {
                draft
                    .validate()
                    .map_err(|e| ServiceError::Validation(format!("order {}: {e}", index + 1)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for order in &orders {
            authorize(identity, Action::CreateOrder(&order.key.shop)).into_result()?;
        }

        let mut tx = self.store.begin().await?;
        let result = create_in(tx.as_mut(), identity, orders).await;
        let created = settle(tx, result).await?;

        tracing::info!(count = created.len(), "Orders created");
        Ok(created)
    }

    /// Move an order to a new status, stamping the matching date.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, then `Unauthorized`, then `Validation` for an
    /// illegal transition or a missing date.
    #[instrument(skip_all, fields(user_id = %identity.user_id, order_id = %id, to = %change.status))]
    pub async fn update_status(
        &self,
        identity: &Identity,
        id: OrderId,
        change: StatusChange,
    ) -> Result<OrderDetails, ServiceError> {
        let mut tx = self.store.begin().await?;
        let result = update_status_in(tx.as_mut(), identity, id, change).await;
        settle(tx, result).await
    }

    /// Apply a partial update to an order's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty patch, `NotFound`, `Unauthorized`
    /// (also for a destination shop outside the caller's), and `Conflict` if
    /// the resulting order number is taken in its shop.
    #[instrument(skip_all, fields(user_id = %identity.user_id, order_id = %id))]
    pub async fn update_fields(
        &self,
        identity: &Identity,
        id: OrderId,
        patch: OrderPatch,
    ) -> Result<OrderDetails, ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::Validation("no fields to update".to_owned()));
        }

        let mut tx = self.store.begin().await?;
        let result = update_fields_in(tx.as_mut(), identity, id, patch).await;
        settle(tx, result).await
    }

    /// Delete an order and unlink it from its customer and creator.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` before `Unauthorized`.
    #[instrument(skip_all, fields(user_id = %identity.user_id, order_id = %id))]
    pub async fn delete(&self, identity: &Identity, id: OrderId) -> Result<(), ServiceError> {
        let mut tx = self.store.begin().await?;
        let result = delete_in(tx.as_mut(), identity, id).await;
        settle(tx, result).await?;

        tracing::info!("Order deleted");
        Ok(())
    }
}

/// Keys that are taken in the store or repeated within `keys`, sorted.
async fn colliding_keys(
    tx: &mut dyn StoreTransaction,
    keys: &[OrderKey],
) -> Result<Vec<OrderKey>, ServiceError> {
    let mut seen = BTreeSet::new();
    let mut colliding: BTreeSet<OrderKey> = keys
        .iter()
        .filter(|key| !seen.insert(*key))
        .cloned()
        .collect();
    colliding.extend(tx.find_existing_keys(keys).await?);
    Ok(colliding.into_iter().collect())
}

fn order_insert_error(err: RepositoryError, key: &OrderKey) -> ServiceError {
    match err {
        RepositoryError::Conflict(_) => ServiceError::order_conflict(vec![key.clone()]),
        other => other.into(),
    }
}

async fn create_in(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    orders: Vec<ValidOrder>,
) -> Result<Vec<OrderDetails>, ServiceError> {
    let keys: Vec<OrderKey> = orders.iter().map(|o| o.key.clone()).collect();
    let colliding = colliding_keys(tx, &keys).await?;
    if !colliding.is_empty() {
        return Err(ServiceError::order_conflict(colliding));
    }

    if tx.find_user(identity.user_id).await?.is_none() {
        return Err(ServiceError::Unauthenticated(
            "account no longer exists".to_owned(),
        ));
    }

    let mut created = Vec::with_capacity(orders.len());
    for order in orders {
        created.push(insert_one(tx, identity, order).await?);
    }
    populate(tx, created).await
}

async fn insert_one(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    order: ValidOrder,
) -> Result<Order, ServiceError> {
    let customer = tx
        .upsert_customer(&NewCustomer {
            name: order.customer_name.clone(),
            phone: order.phone.clone(),
            measurements: order.measurements.clone(),
        })
        .await?;

    let new_order = NewOrder {
        key: order.key,
        dates: order.dates,
        customer_id: customer.id,
        creator_id: identity.user_id,
        products: order.products,
        status: order.status,
        bill: order.bill,
        measurements: order.measurements.unwrap_or_default(),
    };
    let inserted = tx
        .insert_order(&new_order)
        .await
        .map_err(|e| order_insert_error(e, &new_order.key))?;

    tx.link_customer_order(customer.id, inserted.id).await?;
    tx.link_user_order(identity.user_id, inserted.id).await?;

    tracing::debug!(order_id = %inserted.id, customer_id = %customer.id, "Order linked");
    Ok(inserted)
}

async fn load_for_mutation(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    id: OrderId,
) -> Result<Order, ServiceError> {
    let order = tx
        .find_order(id)
        .await?
        .ok_or(ServiceError::NotFound("order"))?;
    authorize(identity, Action::MutateOrder(&order)).into_result()?;
    Ok(order)
}

async fn update_status_in(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    id: OrderId,
    change: StatusChange,
) -> Result<OrderDetails, ServiceError> {
    let mut order = load_for_mutation(tx, identity, id).await?;

    let next = order
        .status
        .transition(change.status)
        .map_err(|e| ServiceError::Validation(e.to_string()))?;
    if let Some(field) = next.stamped_date() {
        let date = change.date.ok_or_else(|| {
            ServiceError::Validation(format!("a {field} date is required to move to {next}"))
        })?;
        order.dates.stamp(field, date);
    }
    order.status = next;
    if let Some(bill) = change.bill {
        let bill = bill.trim();
        if !bill.is_empty() {
            order.bill = Some(bill.to_owned());
        }
    }

    let updated = tx.update_order(&order).await?;
    tracing::info!(status = %updated.status, "Order status changed");
    populate_one(tx, updated).await
}

async fn update_fields_in(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    id: OrderId,
    patch: OrderPatch,
) -> Result<OrderDetails, ServiceError> {
    let mut order = load_for_mutation(tx, identity, id).await?;
    let previous_key = order.key();

    patch.apply(&mut order).map_err(ServiceError::Validation)?;

    if order.shop != previous_key.shop {
        authorize(identity, Action::MutateOrder(&order)).into_result()?;
    }
    let key = order.key();
    if key != previous_key && !tx.find_existing_keys(std::slice::from_ref(&key)).await?.is_empty() {
        return Err(ServiceError::order_conflict(vec![key]));
    }

    let updated = tx
        .update_order(&order)
        .await
        .map_err(|e| order_insert_error(e, &key))?;
    populate_one(tx, updated).await
}

async fn delete_in(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    id: OrderId,
) -> Result<(), ServiceError> {
    let order = load_for_mutation(tx, identity, id).await?;

    tx.unlink_user_order(order.creator_id, order.id).await?;
    tx.unlink_customer_order(order.customer_id, order.id).await?;
    tx.delete_order(order.id).await?;
    Ok(())
}
