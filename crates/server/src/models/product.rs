//! Product domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lotwise_core::ProductId;

/// Internal identity for a catalog item.
///
/// Created lazily the first time a batch or order line references an unseen
/// external product identifier. Never deleted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Surrogate ID, generated on creation.
    pub id: ProductId,
    /// External (platform-side) identifier. Unique, immutable once set.
    pub external_id: String,
    /// Display name.
    pub name: String,
    /// SKU, if known.
    pub sku: Option<String>,
    /// When the product was first referenced.
    pub created_at: DateTime<Utc>,
}
