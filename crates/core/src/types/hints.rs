//! Product metadata hints from the resolver.

use serde::{Deserialize, Serialize};

/// Optional per-product hints used only when stock must be synthesized.
///
/// Both fields are legitimately absent: an unset field is "no hint", never an
/// error. The resolver contract mirrors this - only transport and auth
/// failures are errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductHints {
    /// Shelf life in days; drives the expiry date of a synthesized batch.
    pub shelf_life_days: Option<i64>,
    /// Default quantity for a synthesized batch.
    pub default_batch_quantity: Option<i64>,
}

impl ProductHints {
    /// True when neither hint is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.shelf_life_days.is_none() && self.default_batch_quantity.is_none()
    }
}
