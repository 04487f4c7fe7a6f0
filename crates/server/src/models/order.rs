//! Order domain types and request bodies.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use atelier_core::{
    CustomerId, DateField, Measurements, OrderId, OrderStatus, PhoneNumber, Product, ShopId,
    UserId,
};

use super::customer::CustomerSummary;

/// The natural key of an order: an order number is unique within its shop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderKey {
    pub shop: ShopId,
    pub order_number: String,
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shop, self.order_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDates {
    pub order: NaiveDate,
    pub trial: NaiveDate,
    pub delivery: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<NaiveDate>,
}

impl OrderDates {
    pub fn stamp(&mut self, field: DateField, date: NaiveDate) {
        match field {
            DateField::Trial => self.trial = date,
            DateField::Completion => self.completion = Some(date),
            DateField::Cancelled => self.cancelled = Some(date),
        }
    }
}

/// A tailoring order (domain type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub shop: ShopId,
    pub dates: OrderDates,
    pub customer_id: CustomerId,
    pub creator_id: UserId,
    pub products: Vec<Product>,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill: Option<String>,
    #[serde(default)]
    pub measurements: Measurements,
}

impl Order {
    #[must_use]
    pub fn key(&self) -> OrderKey {
        OrderKey {
            shop: self.shop.clone(),
            order_number: self.order_number.clone(),
        }
    }
}

/// Data for inserting a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub key: OrderKey,
    pub dates: OrderDates,
    pub customer_id: CustomerId,
    pub creator_id: UserId,
    pub products: Vec<Product>,
    pub status: OrderStatus,
    pub bill: Option<String>,
    pub measurements: Measurements,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatorSummary {
    pub id: UserId,
    pub name: String,
}

/// An order joined with its customer and creator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub customer: CustomerSummary,
    pub creator: CreatorSummary,
}

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftDates {
    pub order: Option<NaiveDate>,
    pub trial: Option<NaiveDate>,
    pub delivery: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DraftCustomer {
    pub name: Option<String>,
    pub phone: Option<PhoneNumber>,
}

/// Request body for creating an order.
///
/// Every field is optional at the wire level so that a missing field is
/// reported by name instead of as a generic parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub order_number: Option<String>,
    pub shop: Option<ShopId>,
    #[serde(default)]
    pub dates: DraftDates,
    #[serde(default)]
    pub customer: DraftCustomer,
    pub products: Option<Vec<Product>>,
    pub status: Option<OrderStatus>,
    pub bill: Option<String>,
    pub measurements: Option<Measurements>,
}

/// An order draft with every required field present.
#[derive(Debug, Clone)]
pub struct ValidOrder {
    pub key: OrderKey,
    pub dates: OrderDates,
    pub customer_name: String,
    pub phone: PhoneNumber,
    pub products: Vec<Product>,
    pub status: OrderStatus,
    pub bill: Option<String>,
    /// `None` leaves an existing customer's measurements untouched.
    pub measurements: Option<Measurements>,
}

impl OrderDraft {
    /// Check required fields and basic shape.
    ///
    /// # Errors
    ///
    /// Returns a message naming every missing field, or the first malformed one.
    pub fn validate(self) -> Result<ValidOrder, String> {
        let mut missing = Vec::new();
        let order_number = non_blank(self.order_number);
        let customer_name = non_blank(self.customer.name);
        let products = self.products.filter(|p| !p.is_empty());

        for (present, name) in [
            (order_number.is_some(), "orderNumber"),
            (self.shop.is_some(), "shop"),
            (self.dates.order.is_some(), "dates.order"),
            (self.dates.trial.is_some(), "dates.trial"),
            (self.dates.delivery.is_some(), "dates.delivery"),
            (customer_name.is_some(), "customer.name"),
            (self.customer.phone.is_some(), "customer.phone"),
            (products.is_some(), "products"),
            (self.status.is_some(), "status"),
        ] {
            if !present {
                missing.push(name);
            }
        }

        let (
            Some(order_number),
            Some(shop),
            Some(order),
            Some(trial),
            Some(delivery),
            Some(customer_name),
            Some(phone),
            Some(products),
            Some(status),
        ) = (
            order_number,
            self.shop,
            self.dates.order,
            self.dates.trial,
            self.dates.delivery,
            customer_name,
            self.customer.phone,
            products,
            self.status,
        )
        else {
            return Err(format!("missing required fields: {}", missing.join(", ")));
        };

        validate_products(&products)?;
        if status.is_terminal() {
            return Err(format!("a new order cannot start as {status}"));
        }

        Ok(ValidOrder {
            key: OrderKey { shop, order_number },
            dates: OrderDates {
                order,
                trial,
                delivery,
                completion: None,
                cancelled: None,
            },
            customer_name,
            phone,
            products,
            status,
            bill: non_blank(self.bill),
            measurements: self.measurements,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatesPatch {
    pub order: Option<NaiveDate>,
    pub trial: Option<NaiveDate>,
    pub delivery: Option<NaiveDate>,
}

/// Request body for a partial order update.
///
/// Unknown fields are rejected, which keeps `status`, `customerId` and
/// `creatorId` off this path.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderPatch {
    pub order_number: Option<String>,
    pub shop: Option<ShopId>,
    pub dates: Option<DatesPatch>,
    pub products: Option<Vec<Product>>,
    pub bill: Option<String>,
    pub measurements: Option<Measurements>,
}

impl OrderPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let no_dates = self
            .dates
            .as_ref()
            .is_none_or(|d| d.order.is_none() && d.trial.is_none() && d.delivery.is_none());
        self.order_number.is_none()
            && self.shop.is_none()
            && no_dates
            && self.products.is_none()
            && self.bill.is_none()
            && self.measurements.is_none()
    }

    /// Merge the patch into `order`.
    ///
    /// # Errors
    ///
    /// Returns a message if a supplied field is malformed.
    pub fn apply(self, order: &mut Order) -> Result<(), String> {
        if let Some(number) = self.order_number {
            order.order_number =
                non_blank(Some(number)).ok_or_else(|| "orderNumber cannot be blank".to_owned())?;
        }
        if let Some(shop) = self.shop {
            order.shop = shop;
        }
        if let Some(dates) = self.dates {
            if let Some(date) = dates.order {
                order.dates.order = date;
            }
            if let Some(date) = dates.trial {
                order.dates.trial = date;
            }
            if let Some(date) = dates.delivery {
                order.dates.delivery = date;
            }
        }
        if let Some(products) = self.products {
            if products.is_empty() {
                return Err("products cannot be empty".to_owned());
            }
            validate_products(&products)?;
            order.products = products;
        }
        if let Some(bill) = self.bill {
            order.bill = non_blank(Some(bill));
        }
        if let Some(measurements) = self.measurements {
            order.measurements = measurements;
        }
        Ok(())
    }
}

/// Request body for `PUT /orders/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub date: Option<NaiveDate>,
    pub bill: Option<String>,
}

/// Caller-supplied filter for listing orders (`GET /orders?...`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub shop: Option<ShopId>,
    pub creator: Option<UserId>,
    /// Only orders created by the caller.
    #[serde(default)]
    pub mine: bool,
    pub status: Option<OrderStatus>,
    pub ordered_from: Option<NaiveDate>,
    pub ordered_to: Option<NaiveDate>,
    pub trial_on: Option<NaiveDate>,
    pub delivery_on: Option<NaiveDate>,
}

/// Store-level filter for orders. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub ids: Option<Vec<OrderId>>,
    pub shops: Option<BTreeSet<ShopId>>,
    pub creator: Option<UserId>,
    pub customers: Option<Vec<CustomerId>>,
    pub status: Option<OrderStatus>,
    pub ordered_from: Option<NaiveDate>,
    pub ordered_to: Option<NaiveDate>,
    pub trial_on: Option<NaiveDate>,
    pub delivery_on: Option<NaiveDate>,
    /// Case-insensitive substring of the order number or bill.
    pub text: Option<String>,
}

impl OrderFilter {
    /// Whether `order` satisfies every set criterion.
    ///
    /// Used by the in-memory store; the `PostgreSQL` store translates the
    /// same criteria into SQL.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        self.ids.as_ref().is_none_or(|ids| ids.contains(&order.id))
            && self.shops.as_ref().is_none_or(|s| s.contains(&order.shop))
            && self.creator.is_none_or(|c| c == order.creator_id)
            && self
                .customers
                .as_ref()
                .is_none_or(|c| c.contains(&order.customer_id))
            && self.status.is_none_or(|s| s == order.status)
            && self.ordered_from.is_none_or(|d| order.dates.order >= d)
            && self.ordered_to.is_none_or(|d| order.dates.order <= d)
            && self.trial_on.is_none_or(|d| order.dates.trial == d)
            && self.delivery_on.is_none_or(|d| order.dates.delivery == d)
            && self.text.as_deref().is_none_or(|t| {
                contains_ignore_case(&order.order_number, t)
                    || order
                        .bill
                        .as_deref()
                        .is_some_and(|b| contains_ignore_case(b, t))
            })
    }
}

/// Case-insensitive literal substring test.
#[must_use]
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

fn validate_products(products: &[Product]) -> Result<(), String> {
    for product in products {
        if product.kind.trim().is_empty() {
            return Err("product type cannot be blank".to_owned());
        }
        if product.quantity == 0 {
            return Err(format!("quantity of {} must be at least 1", product.kind));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> serde_json::Value {
        json!({
            "orderNumber": "O-100",
            "shop": "S1",
            "dates": {"order": "2025-03-01", "trial": "2025-03-10", "delivery": "2025-03-20"},
            "customer": {"name": "Alice", "phone": "555-1"},
            "products": [{"type": "Shirt", "quantity": 1}],
            "status": "Pending"
        })
    }

    #[test]
    fn test_complete_draft_validates() {
        let draft: OrderDraft = serde_json::from_value(draft()).unwrap();
        let valid = draft.validate().unwrap();
        assert_eq!(valid.key.order_number, "O-100");
        assert_eq!(valid.key.shop.as_str(), "S1");
        assert_eq!(valid.customer_name, "Alice");
        assert!(valid.measurements.is_none());
        assert!(valid.bill.is_none());
    }

    #[test]
    fn test_missing_fields_are_named() {
        let mut value = draft();
        value.as_object_mut().unwrap().remove("shop");
        value["dates"].as_object_mut().unwrap().remove("trial");
        value["customer"]["name"] = json!("   ");
        let draft: OrderDraft = serde_json::from_value(value).unwrap();
        let err = draft.validate().unwrap_err();
        assert_eq!(
            err,
            "missing required fields: shop, dates.trial, customer.name"
        );
    }

    #[test]
    fn test_empty_products_and_zero_quantity_rejected() {
        let mut value = draft();
        value["products"] = json!([]);
        let draft: OrderDraft = serde_json::from_value(value.clone()).unwrap();
        assert!(draft.validate().unwrap_err().contains("products"));

        value["products"] = json!([{"type": "Shirt", "quantity": 0}]);
        let draft: OrderDraft = serde_json::from_value(value).unwrap();
        assert!(draft.validate().unwrap_err().contains("at least 1"));
    }

    #[test]
    fn test_terminal_initial_status_rejected() {
        let mut value = draft();
        value["status"] = json!("Completed");
        let draft: OrderDraft = serde_json::from_value(value).unwrap();
        assert!(draft.validate().is_err());
    }

    #[test]
    fn test_patch_rejects_forbidden_fields() {
        assert!(serde_json::from_value::<OrderPatch>(json!({"status": "Trial"})).is_err());
        assert!(serde_json::from_value::<OrderPatch>(json!({"customerId": 3})).is_err());
        assert!(serde_json::from_value::<OrderPatch>(json!({"creatorId": 3})).is_err());
    }

    #[test]
    fn test_patch_emptiness() {
        assert!(OrderPatch::default().is_empty());
        let patch: OrderPatch = serde_json::from_value(json!({"dates": {}})).unwrap();
        assert!(patch.is_empty());
        let patch: OrderPatch = serde_json::from_value(json!({"bill": "B-9"})).unwrap();
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_filter_text_matches_number_or_bill() {
        let draft: OrderDraft = serde_json::from_value(draft()).unwrap();
        let valid = draft.validate().unwrap();
        let order = Order {
            id: OrderId::new(1),
            order_number: valid.key.order_number,
            shop: valid.key.shop,
            dates: valid.dates,
            customer_id: CustomerId::new(1),
            creator_id: UserId::new(1),
            products: valid.products,
            status: valid.status,
            bill: Some("INV-77".to_owned()),
            measurements: Measurements::default(),
        };
        let by_text = |t: &str| OrderFilter {
            text: Some(t.to_owned()),
            ..OrderFilter::default()
        };
        assert!(by_text("o-1").matches(&order));
        assert!(by_text("inv").matches(&order));
        assert!(!by_text("555").matches(&order));
    }
}
