//! Batch (lot) domain models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lotwise_core::{BatchId, ProductId};

/// A dated lot of a product tracked as a single depletable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique batch ID.
    pub id: BatchId,
    /// Product this batch belongs to.
    pub product_id: ProductId,
    /// Human-assigned batch number. Unique, immutable.
    pub batch_number: String,
    /// Expiry date; `None` means expiry is not tracked for this batch.
    pub expires_on: Option<NaiveDate>,
    /// Units remaining. Never negative; a decrement that would make it
    /// negative must never commit.
    pub remaining: i64,
    /// When the batch was created.
    pub created_at: DateTime<Utc>,
}

/// Input for creating a batch.
#[derive(Debug, Clone, Deserialize)]
pub struct NewBatch {
    /// Owning product.
    pub product_id: ProductId,
    /// Batch number identifier.
    pub batch_number: String,
    /// Optional expiry date.
    pub expires_on: Option<NaiveDate>,
    /// Initial quantity.
    pub quantity: i64,
}

/// Administrative correction to a batch.
///
/// Only allowed while no consumption references the batch; afterwards the
/// batch is immutable so that traceability facts stay consistent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchCorrection {
    /// New expiry date.
    pub expires_on: Option<NaiveDate>,
    /// New remaining quantity.
    pub quantity: Option<i64>,
}

impl BatchCorrection {
    /// True when the correction changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.expires_on.is_none() && self.quantity.is_none()
    }
}
