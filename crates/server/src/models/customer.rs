//! Customer domain types.

use serde::{Deserialize, Serialize};

use atelier_core::{CustomerId, Measurements, OrderId, PhoneNumber, ShopId};

use super::order::OrderDetails;

/// A customer, identified system-wide by phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub phone: PhoneNumber,
    pub orders: Vec<OrderId>,
    pub measurements: Measurements,
}

/// Customer data carried by a new order, keyed by phone.
#[derive(Debug, Clone)]
pub struct NewCustomer {
    pub name: String,
    pub phone: PhoneNumber,
    /// `None` keeps an existing customer's measurements (empty for a new one).
    pub measurements: Option<Measurements>,
}

/// The customer fields shown alongside an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSummary {
    pub id: CustomerId,
    pub name: String,
    pub phone: PhoneNumber,
}

impl From<&Customer> for CustomerSummary {
    fn from(customer: &Customer) -> Self {
        Self {
            id: customer.id,
            name: customer.name.clone(),
            phone: customer.phone.clone(),
        }
    }
}

/// A customer together with the orders the caller may see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    #[serde(flatten)]
    pub customer: Customer,
    #[serde(rename = "orderDetails")]
    pub order_details: Vec<OrderDetails>,
}

/// Store-level filter for listing customers. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    pub ids: Option<Vec<CustomerId>>,
    /// Case-insensitive substring of the name or phone.
    pub term: Option<String>,
    /// Customers with at least one order in one of these shops.
    pub ordered_in: Option<std::collections::BTreeSet<ShopId>>,
}
