//! Platform webhook payload mapping.
//!
//! The commerce platform delivers orders in its own wire shape, full of
//! optional and loosely-typed fields. This module is the explicit
//! mapping/validation stage between that payload and the canonical
//! [`OrderSubmission`] - the allocation engine never sees platform JSON.
//!
//! Signature verification of the webhook happens upstream; by the time a
//! payload reaches this module it is authenticated.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use lotwise_core::{LineItem, OrderSubmission};

/// A platform-native order as delivered by the webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformOrder {
    /// Platform order ID.
    pub id: i64,
    /// Human-facing order label (e.g. "#1001").
    #[serde(default)]
    pub name: Option<String>,
    /// When the order was placed.
    pub created_at: DateTime<Utc>,
    /// Customer details, if shared.
    #[serde(default)]
    pub customer: Option<PlatformCustomer>,
    /// Ordered line items.
    #[serde(default)]
    pub line_items: Vec<PlatformLineItem>,
}

/// Customer details on a platform order.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformCustomer {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// One line item on a platform order.
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformLineItem {
    /// Platform product ID. Absent for custom/one-off items.
    #[serde(default)]
    pub product_id: Option<i64>,
    /// Item title.
    #[serde(default)]
    pub title: Option<String>,
    /// SKU, if set.
    #[serde(default)]
    pub sku: Option<String>,
    /// Ordered quantity.
    pub quantity: i64,
}

/// Map a platform order into the canonical submission shape.
///
/// - Lines with non-positive quantity are filtered silently (the platform
///   legitimately sends them, e.g. removed items).
/// - Lines without a product reference cannot be allocated and are skipped
///   with a warning.
/// - The result may have no lines at all; the webhook boundary acknowledges
///   such orders without invoking the engine.
#[must_use]
pub fn map_order(order: PlatformOrder) -> OrderSubmission {
    let external_order_id = order.id.to_string();
    let customer = order.customer.as_ref().and_then(customer_label);

    let lines = order
        .line_items
        .into_iter()
        .filter_map(|item| {
            let Some(product_id) = item.product_id else {
                tracing::warn!(
                    external_order_id = %external_order_id,
                    title = item.title.as_deref().unwrap_or("<untitled>"),
                    "skipping line item without product reference"
                );
                return None;
            };
            Some(LineItem {
                external_product_id: product_id.to_string(),
                name: item.title,
                sku: item.sku,
                quantity: item.quantity,
            })
        })
        .collect();

    OrderSubmission {
        external_order_id,
        customer,
        ordered_at: order.created_at,
        lines,
    }
    .sanitized()
}

/// Best-effort customer label: "First Last", falling back to the email.
fn customer_label(customer: &PlatformCustomer) -> Option<String> {
    let name = [customer.first_name.as_deref(), customer.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let name = name.trim().to_string();

    if name.is_empty() {
        customer.email.clone()
    } else {
        Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "id": 820_982_911,
            "name": "#1001",
            "created_at": "2025-03-04T12:30:45Z",
            "customer": {
                "first_name": "Ada",
                "last_name": "Lovelace",
                "email": "ada@example.com"
            },
            "line_items": [
                { "product_id": 632_910_392, "title": "Set Yoghurt", "sku": "YOG-500", "quantity": 8 },
                { "product_id": 632_910_393, "title": "Kefir", "sku": null, "quantity": 0 },
                { "product_id": null, "title": "Gift note", "quantity": 1 }
            ]
        })
    }

    #[test]
    fn test_map_order_canonical_shape() {
        let order: PlatformOrder = serde_json::from_value(payload()).expect("payload");
        let submission = map_order(order);

        assert_eq!(submission.external_order_id, "820982911");
        assert_eq!(submission.customer.as_deref(), Some("Ada Lovelace"));
        assert_eq!(
            submission.ordered_at,
            "2025-03-04T12:30:45Z".parse::<DateTime<Utc>>().expect("timestamp")
        );
    }

    #[test]
    fn test_map_order_filters_unusable_lines() {
        let order: PlatformOrder = serde_json::from_value(payload()).expect("payload");
        let submission = map_order(order);

        // Zero-quantity and product-less lines are gone; the real line stays.
        assert_eq!(submission.lines.len(), 1);
        assert_eq!(submission.lines[0].external_product_id, "632910392");
        assert_eq!(submission.lines[0].sku.as_deref(), Some("YOG-500"));
        assert_eq!(submission.lines[0].quantity, 8);
    }

    #[test]
    fn test_customer_label_falls_back_to_email() {
        let customer = PlatformCustomer {
            first_name: None,
            last_name: None,
            email: Some("ada@example.com".to_string()),
        };
        assert_eq!(customer_label(&customer).as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn test_map_order_without_customer() {
        let order: PlatformOrder = serde_json::from_value(serde_json::json!({
            "id": 1,
            "created_at": "2025-03-04T12:30:45Z",
            "line_items": []
        }))
        .expect("payload");

        let submission = map_order(order);
        assert_eq!(submission.customer, None);
        assert!(submission.lines.is_empty());
    }
}
