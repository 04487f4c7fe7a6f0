//! Garment data attached to orders and customers.
//!
//! Pure data. Measurements are stored as JSON documents and never inspected by
//! the server beyond being carried from an order onto its customer.

use serde::{Deserialize, Serialize};

/// One line of an order: a garment type and how many of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "type")]
    pub kind: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shirt {
    pub length: f64,
    pub shoulder: f64,
    pub sleeve_length: f64,
    pub chest: f64,
    pub waist: f64,
    pub hip: f64,
    pub neck: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trouser {
    pub length: f64,
    pub crotch: f64,
    pub waist: f64,
    pub hip: f64,
    pub thigh: f64,
    pub knee: f64,
    pub bottom: f64,
    pub f_low: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jacket {
    pub length: f64,
    pub shoulder: f64,
    pub sleeve_length: f64,
    pub chest: f64,
    pub waist: f64,
    pub hip: f64,
    pub neck: f64,
    pub cross_back: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

/// Body measurements, per garment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shirt: Option<Shirt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trouser: Option<Trouser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jacket: Option<Jacket>,
}

impl Measurements {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.shirt.is_none() && self.trouser.is_none() && self.jacket.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_uses_type_key() {
        let product: Product = serde_json::from_str(r#"{"type":"Shirt","quantity":2}"#).unwrap();
        assert_eq!(product.kind, "Shirt");
        assert_eq!(product.quantity, 2);
        assert!(serde_json::from_str::<Product>(r#"{"type":"Shirt","quantity":-1}"#).is_err());
    }

    #[test]
    fn test_measurements_camel_case() {
        let json = r#"{"trouser":{"length":40,"crotch":11,"waist":32,"hip":38,"thigh":22,
            "knee":16,"bottom":14,"fLow":10,"remark":"slim"}}"#;
        let m: Measurements = serde_json::from_str(json).unwrap();
        let trouser = m.trouser.as_ref().unwrap();
        assert!((trouser.f_low - 10.0).abs() < f64::EPSILON);
        assert_eq!(trouser.remark.as_deref(), Some("slim"));
        assert!(m.shirt.is_none());
        assert!(!m.is_empty());

        let out = serde_json::to_value(&m).unwrap();
        assert!(out.get("shirt").is_none());
        assert!(out["trouser"].get("fLow").is_some());
    }

    #[test]
    fn test_empty_measurements() {
        let m: Measurements = serde_json::from_str("{}").unwrap();
        assert!(m.is_empty());
    }
}
