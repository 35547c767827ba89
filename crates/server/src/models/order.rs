//! Order ledger domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lotwise_core::{BatchId, ConsumptionId, OrderId, ProductId};

/// One processed external sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Surrogate ID.
    pub id: OrderId,
    /// External order identifier - the idempotency key. Unique.
    pub external_id: String,
    /// Free-form customer label.
    pub customer: Option<String>,
    /// When the order was placed.
    pub ordered_at: DateTime<Utc>,
    /// When the order was recorded.
    pub created_at: DateTime<Utc>,
}

/// Input for recording an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// External order identifier.
    pub external_id: String,
    /// Customer label, if known.
    pub customer: Option<String>,
    /// When the order was placed.
    pub ordered_at: DateTime<Utc>,
}

/// An immutable consumption fact: which order drew how much from which batch.
///
/// A single external order line may produce multiple consumptions when it was
/// split across batches. The product reference is denormalized for query
/// convenience and always agrees with the batch's product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consumption {
    /// Unique consumption ID.
    pub id: ConsumptionId,
    /// Order that consumed.
    pub order_id: OrderId,
    /// Product consumed.
    pub product_id: ProductId,
    /// Batch consumed from.
    pub batch_id: BatchId,
    /// Units consumed.
    pub quantity: i64,
}

/// Input for recording a consumption alongside its order.
#[derive(Debug, Clone)]
pub struct NewConsumption {
    /// Product consumed.
    pub product_id: ProductId,
    /// Batch consumed from.
    pub batch_id: BatchId,
    /// Units consumed.
    pub quantity: i64,
}

/// One allocation of an order, enriched for presentation: which batch covered
/// how many units of which product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationLine {
    /// External product identifier.
    pub external_product_id: String,
    /// Batch number drawn from.
    pub batch_number: String,
    /// Units drawn.
    pub quantity: i64,
}

/// One traceability row: an order that consumed from a batch.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    /// External order identifier.
    pub order_external_id: String,
    /// Customer label, if recorded.
    pub customer: Option<String>,
    /// When the order was placed.
    pub ordered_at: DateTime<Utc>,
    /// Product name at query time.
    pub product_name: String,
    /// Units drawn from the batch.
    pub quantity: i64,
}
