//! Scoped reads of orders and customers.
//!
//! Every read is filtered by the caller's [`Scope`]. Joined views are built
//! with explicit batch lookups ([`populate`]) rather than per-row fetches.

use std::collections::{BTreeMap, BTreeSet};

use tracing::instrument;

use atelier_core::{CustomerId, OrderId, UserId};

use super::credentials::Identity;
use super::error::ServiceError;
use super::policy::{Action, Scope, authorize};
use super::settle;
use crate::db::{EntityStore, RepositoryError, StoreTransaction};
use crate::models::{
    CreatorSummary, Customer, CustomerFilter, CustomerProfile, CustomerSummary, Order,
    OrderDetails, OrderFilter, OrderQuery, UserFilter,
};

/// Read-side service for orders and customers.
pub struct QueryService<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> QueryService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    /// List orders matching `query` within the caller's scope.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if `query.shop` is outside the caller's shops,
    /// and `Validation` for an inverted date range or a conflicting creator.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn list_orders(
        &self,
        identity: &Identity,
        query: OrderQuery,
    ) -> Result<Vec<OrderDetails>, ServiceError> {
        let scope = authorize(identity, Action::ReadOrders).into_result()?;

        let shops = match (query.shop, &scope) {
            (Some(shop), scope) if !scope.permits_shop(&shop) => {
                return Err(ServiceError::Unauthorized(format!(
                    "shop {shop} is not one of your shops"
                )));
            }
            (Some(shop), _) => Some(BTreeSet::from([shop])),
            (None, scope) => scope.shops().cloned(),
        };

        let creator = match (query.mine, query.creator) {
            (true, Some(creator)) if creator != identity.user_id => {
                return Err(ServiceError::Validation(
                    "use either creator or mine, not both".to_owned(),
                ));
            }
            (true, _) => Some(identity.user_id),
            (false, creator) => creator,
        };

        if let (Some(from), Some(to)) = (query.ordered_from, query.ordered_to)
            && from > to
        {
            return Err(ServiceError::Validation(
                "orderedFrom must not be after orderedTo".to_owned(),
            ));
        }

        let filter = OrderFilter {
            shops,
            creator,
            status: query.status,
            ordered_from: query.ordered_from,
            ordered_to: query.ordered_to,
            trial_on: query.trial_on,
            delivery_on: query.delivery_on,
            ..OrderFilter::default()
        };

        let mut tx = self.store.begin().await?;
        let result = find_populated(tx.as_mut(), &filter).await;
        settle(tx, result).await
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` before `Unauthorized`.
    #[instrument(skip_all, fields(user_id = %identity.user_id, order_id = %id))]
    pub async fn get_order(
        &self,
        identity: &Identity,
        id: OrderId,
    ) -> Result<OrderDetails, ServiceError> {
        let mut tx = self.store.begin().await?;
        let result = get_order_in(tx.as_mut(), identity, id).await;
        settle(tx, result).await
    }

    /// Search orders by order number, bill, customer name or customer phone.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank term.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn search_orders(
        &self,
        identity: &Identity,
        term: &str,
    ) -> Result<Vec<OrderDetails>, ServiceError> {
        let term = search_term(term)?;
        let scope = authorize(identity, Action::ReadOrders).into_result()?;

        let mut tx = self.store.begin().await?;
        let result = search_orders_in(tx.as_mut(), &scope, term).await;
        settle(tx, result).await
    }

    /// List customers visible to the caller.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for the User role.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn list_customers(&self, identity: &Identity) -> Result<Vec<Customer>, ServiceError> {
        self.find_customers(identity, None).await
    }

    /// Search visible customers by name or phone.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank term and `Unauthorized` for the User role.
    #[instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn search_customers(
        &self,
        identity: &Identity,
        term: &str,
    ) -> Result<Vec<Customer>, ServiceError> {
        let term = search_term(term)?;
        self.find_customers(identity, Some(term.to_owned())).await
    }

    /// Fetch one customer with the orders the caller may see.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the customer does not exist, and `Unauthorized`
    /// if a scoped caller can see none of their orders.
    #[instrument(skip_all, fields(user_id = %identity.user_id, customer_id = %id))]
    pub async fn get_customer(
        &self,
        identity: &Identity,
        id: CustomerId,
    ) -> Result<CustomerProfile, ServiceError> {
        let mut tx = self.store.begin().await?;
        let result = get_customer_in(tx.as_mut(), identity, id).await;
        settle(tx, result).await
    }

    async fn find_customers(
        &self,
        identity: &Identity,
        term: Option<String>,
    ) -> Result<Vec<Customer>, ServiceError> {
        let scope = authorize(identity, Action::ReadCustomers).into_result()?;
        let filter = CustomerFilter {
            term,
            ordered_in: scope.shops().cloned(),
            ..CustomerFilter::default()
        };

        let mut tx = self.store.begin().await?;
        let result = tx.find_customers(&filter).await.map_err(ServiceError::from);
        settle(tx, result).await
    }
}

fn search_term(term: &str) -> Result<&str, ServiceError> {
    let term = term.trim();
    if term.is_empty() {
        return Err(ServiceError::Validation(
            "search term cannot be empty".to_owned(),
        ));
    }
    Ok(term)
}

async fn find_populated(
    tx: &mut dyn StoreTransaction,
    filter: &OrderFilter,
) -> Result<Vec<OrderDetails>, ServiceError> {
    let orders = tx.find_orders(filter).await?;
    populate(tx, orders).await
}

async fn get_order_in(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    id: OrderId,
) -> Result<OrderDetails, ServiceError> {
    let order = tx
        .find_order(id)
        .await?
        .ok_or(ServiceError::NotFound("order"))?;
    authorize(identity, Action::ReadOrder(&order)).into_result()?;
    populate_one(tx, order).await
}

async fn search_orders_in(
    tx: &mut dyn StoreTransaction,
    scope: &Scope,
    term: &str,
) -> Result<Vec<OrderDetails>, ServiceError> {
    let candidates: Vec<CustomerId> = tx
        .find_customers(&CustomerFilter {
            term: Some(term.to_owned()),
            ..CustomerFilter::default()
        })
        .await?
        .iter()
        .map(|c| c.id)
        .collect();

    let mut found: BTreeMap<OrderId, Order> = BTreeMap::new();
    if !candidates.is_empty() {
        let by_customer = OrderFilter {
            customers: Some(candidates),
            shops: scope.shops().cloned(),
            ..OrderFilter::default()
        };
        found.extend(tx.find_orders(&by_customer).await?.into_iter().map(|o| (o.id, o)));
    }
    let by_text = OrderFilter {
        text: Some(term.to_owned()),
        shops: scope.shops().cloned(),
        ..OrderFilter::default()
    };
    found.extend(tx.find_orders(&by_text).await?.into_iter().map(|o| (o.id, o)));

    populate(tx, found.into_values().collect()).await
}

async fn get_customer_in(
    tx: &mut dyn StoreTransaction,
    identity: &Identity,
    id: CustomerId,
) -> Result<CustomerProfile, ServiceError> {
    let mut customer = tx
        .find_customer(id)
        .await?
        .ok_or(ServiceError::NotFound("customer"))?;
    let scope = authorize(identity, Action::ReadOrders).into_result()?;

    let orders = tx
        .find_orders(&OrderFilter {
            customers: Some(vec![id]),
            shops: scope.shops().cloned(),
            ..OrderFilter::default()
        })
        .await?;

    if let Scope::Shops(_) = scope {
        if orders.is_empty() {
            return Err(ServiceError::Unauthorized(
                "customer has no orders in your shops".to_owned(),
            ));
        }
        let visible: BTreeSet<OrderId> = orders.iter().map(|o| o.id).collect();
        customer.orders.retain(|id| visible.contains(id));
    }

    let order_details = populate(tx, orders).await?;
    Ok(CustomerProfile {
        customer,
        order_details,
    })
}

/// Join orders with their customer and creator summaries.
///
/// Two batch lookups regardless of how many orders are passed. A dangling
/// reference is reported as data corruption.
pub(crate) async fn populate(
    tx: &mut dyn StoreTransaction,
    orders: Vec<Order>,
) -> Result<Vec<OrderDetails>, ServiceError> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let customer_ids: BTreeSet<CustomerId> = orders.iter().map(|o| o.customer_id).collect();
    let creator_ids: BTreeSet<UserId> = orders.iter().map(|o| o.creator_id).collect();

    let customers: BTreeMap<CustomerId, CustomerSummary> = tx
        .find_customers(&CustomerFilter {
            ids: Some(customer_ids.into_iter().collect()),
            ..CustomerFilter::default()
        })
        .await?
        .iter()
        .map(|c| (c.id, CustomerSummary::from(c)))
        .collect();
    let creators: BTreeMap<UserId, CreatorSummary> = tx
        .find_users(&UserFilter {
            ids: Some(creator_ids.into_iter().collect()),
            ..UserFilter::default()
        })
        .await?
        .into_iter()
        .map(|u| {
            (
                u.id,
                CreatorSummary {
                    id: u.id,
                    name: u.name,
                },
            )
        })
        .collect();

    orders
        .into_iter()
        .map(|order| {
            let customer = customers.get(&order.customer_id).cloned().ok_or_else(|| {
                dangling(format!(
                    "order {} references missing customer {}",
                    order.id, order.customer_id
                ))
            })?;
            let creator = creators.get(&order.creator_id).cloned().ok_or_else(|| {
                dangling(format!(
                    "order {} references missing creator {}",
                    order.id, order.creator_id
                ))
            })?;
            Ok(OrderDetails {
                order,
                customer,
                creator,
            })
        })
        .collect()
}

pub(crate) async fn populate_one(
    tx: &mut dyn StoreTransaction,
    order: Order,
) -> Result<OrderDetails, ServiceError> {
    populate(tx, vec![order])
        .await?
        .pop()
        .ok_or_else(|| dangling("populated order vanished".to_owned()))
}

fn dangling(message: String) -> ServiceError {
    ServiceError::TransactionFailure(RepositoryError::DataCorruption(message))
}
