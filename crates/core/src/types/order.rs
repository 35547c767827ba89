//! Canonical order-submission types.
//!
//! Every inbound channel (direct API call, platform webhook) is mapped into
//! this shape before the allocation engine sees it. The engine never parses
//! platform payloads itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One line of an inbound order: a product reference and a quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    /// External (platform-side) product identifier.
    pub external_product_id: String,
    /// Display name, if the channel supplied one.
    pub name: Option<String>,
    /// SKU, if the channel supplied one.
    pub sku: Option<String>,
    /// Units ordered. Lines with `quantity <= 0` are filtered at the
    /// boundary, never rejected - upstream channels legitimately send them.
    pub quantity: i64,
}

/// A complete inbound order in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSubmission {
    /// External order identifier - the idempotency key.
    pub external_order_id: String,
    /// Free-form customer label, if known.
    pub customer: Option<String>,
    /// When the order was placed.
    pub ordered_at: DateTime<Utc>,
    /// Ordered line items.
    pub lines: Vec<LineItem>,
}

impl OrderSubmission {
    /// Drop lines with non-positive quantity.
    ///
    /// Upstream sources may send zero-quantity lines (e.g. free samples
    /// removed from an order); those are filtered silently rather than
    /// rejected.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.lines.retain(|line| line.quantity > 0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product: &str, quantity: i64) -> LineItem {
        LineItem {
            external_product_id: product.to_string(),
            name: None,
            sku: None,
            quantity,
        }
    }

    #[test]
    fn test_sanitized_drops_non_positive_lines() {
        let submission = OrderSubmission {
            external_order_id: "ord-1".to_string(),
            customer: None,
            ordered_at: Utc::now(),
            lines: vec![line("p1", 3), line("p2", 0), line("p3", -2)],
        };

        let sanitized = submission.sanitized();
        assert_eq!(sanitized.lines.len(), 1);
        assert_eq!(sanitized.lines[0].external_product_id, "p1");
    }

    #[test]
    fn test_sanitized_keeps_positive_lines() {
        let submission = OrderSubmission {
            external_order_id: "ord-2".to_string(),
            customer: Some("Ada".to_string()),
            ordered_at: Utc::now(),
            lines: vec![line("p1", 1), line("p2", 2)],
        };

        assert_eq!(submission.sanitized().lines.len(), 2);
    }
}
