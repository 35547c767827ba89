//! Pure allocation policy.
//!
//! Everything here is deterministic and side-effect free: the FEFO ordering,
//! how a required quantity is split across candidate batches, and the
//! parameters of a batch synthesized to cover a shortfall. The transactional
//! machinery lives in [`super::processor`].

use std::cmp::Ordering;

use chrono::{DateTime, Days, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use lotwise_core::BatchId;

use crate::models::Batch;

/// Fallback token for synthesized batch numbers when no SKU is known.
const FALLBACK_SKU_TOKEN: &str = "LOT";

/// FEFO ordering: expiry date ascending, batches with no expiry date last,
/// ties broken by creation time ascending.
///
/// This ordering is a policy invariant - it minimizes expired/stale stock.
/// An undated batch is never chosen while any dated batch has stock.
#[must_use]
pub fn fefo_cmp(a: &Batch, b: &Batch) -> Ordering {
    match (a.expires_on, b.expires_on) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.created_at.cmp(&b.created_at)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.created_at.cmp(&b.created_at),
    }
}

/// One planned draw against an existing batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    /// Batch to draw from.
    pub batch_id: BatchId,
    /// Batch number, carried for the consumption record.
    pub batch_number: String,
    /// Units to draw.
    pub quantity: i64,
}

/// How a required quantity splits across the candidate batches.
#[derive(Debug, Clone)]
pub struct DrawPlan {
    /// Draws in candidate order.
    pub draws: Vec<Draw>,
    /// Requirement left uncovered by existing stock.
    pub outstanding: i64,
}

/// Split `required` units across `candidates`, consuming
/// `min(outstanding, batch.remaining)` from each in order and stopping early
/// once the requirement reaches zero.
///
/// `candidates` must already be in FEFO order (the store guarantees this for
/// fulfillable batches).
#[must_use]
pub fn plan_draws(candidates: &[Batch], required: i64) -> DrawPlan {
    let mut outstanding = required;
    let mut draws = Vec::new();

    for batch in candidates {
        if outstanding == 0 {
            break;
        }
        let take = outstanding.min(batch.remaining);
        if take <= 0 {
            continue;
        }
        draws.push(Draw {
            batch_id: batch.id,
            batch_number: batch.batch_number.clone(),
            quantity: take,
        });
        outstanding -= take;
    }

    DrawPlan { draws, outstanding }
}

/// Deterministic, collision-resistant number for a synthesized batch.
///
/// Derived from the product SKU (or a fallback token), the order timestamp,
/// and a short digest of the order/product pair. Deterministic so a retried
/// transaction reproduces the same number; the digest keeps concurrent
/// orders in the same second from colliding.
#[must_use]
pub fn synthesized_batch_number(
    sku: Option<&str>,
    external_order_id: &str,
    external_product_id: &str,
    ordered_at: DateTime<Utc>,
) -> String {
    let token = sku
        .map(sku_token)
        .filter(|token| !token.is_empty())
        .unwrap_or_else(|| FALLBACK_SKU_TOKEN.to_string());

    let digest = Sha256::digest(format!("{external_order_id}:{external_product_id}"));
    let suffix: String = hex::encode(digest).chars().take(8).collect();

    format!(
        "{token}-{}-{}",
        ordered_at.format("%Y%m%d%H%M%S"),
        suffix.to_uppercase()
    )
}

/// Expiry date of a synthesized batch: order date plus shelf life, or none
/// when no usable hint exists.
#[must_use]
pub fn synthesized_expiry(
    ordered_at: DateTime<Utc>,
    shelf_life_days: Option<i64>,
) -> Option<NaiveDate> {
    let days = u64::try_from(shelf_life_days?).ok()?;
    ordered_at.date_naive().checked_add_days(Days::new(days))
}

/// Initial quantity of a synthesized batch: at least the outstanding
/// requirement, grown to the default-batch-quantity hint when that is larger.
#[must_use]
pub fn synthesized_quantity(default_batch_quantity: Option<i64>, outstanding: i64) -> i64 {
    default_batch_quantity.unwrap_or(0).max(outstanding)
}

/// Normalize a SKU into a batch-number token: uppercased, alphanumerics and
/// dashes only.
fn sku_token(sku: &str) -> String {
    sku.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lotwise_core::ProductId;

    fn batch(id: i64, expires_on: Option<&str>, remaining: i64, created_secs: i64) -> Batch {
        Batch {
            id: BatchId::new(id),
            product_id: ProductId::new(1),
            batch_number: format!("B-{id}"),
            expires_on: expires_on.map(|d| d.parse().expect("date")),
            remaining,
            created_at: Utc.timestamp_opt(created_secs, 0).single().expect("timestamp"),
        }
    }

    #[test]
    fn test_fefo_earliest_expiry_first() {
        let a = batch(1, Some("2025-02-01"), 10, 0);
        let b = batch(2, Some("2025-01-01"), 10, 100);
        assert_eq!(fefo_cmp(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_fefo_undated_batches_last() {
        let dated = batch(1, Some("2099-12-31"), 10, 100);
        let undated = batch(2, None, 10, 0);
        assert_eq!(fefo_cmp(&dated, &undated), Ordering::Less);
    }

    #[test]
    fn test_fefo_ties_broken_by_creation_time() {
        let older = batch(1, Some("2025-01-01"), 10, 0);
        let newer = batch(2, Some("2025-01-01"), 10, 100);
        assert_eq!(fefo_cmp(&older, &newer), Ordering::Less);

        let undated_older = batch(3, None, 10, 0);
        let undated_newer = batch(4, None, 10, 100);
        assert_eq!(fefo_cmp(&undated_older, &undated_newer), Ordering::Less);
    }

    #[test]
    fn test_plan_splits_across_batches() {
        // Scenario: B1 (qty 5) expires first, B2 (qty 10) later; need 8.
        let candidates = vec![batch(1, Some("2025-01-01"), 5, 0), batch(2, Some("2025-02-01"), 10, 0)];
        let plan = plan_draws(&candidates, 8);

        assert_eq!(plan.outstanding, 0);
        assert_eq!(plan.draws.len(), 2);
        assert_eq!(plan.draws[0].quantity, 5);
        assert_eq!(plan.draws[1].quantity, 3);
    }

    #[test]
    fn test_plan_stops_early_when_covered() {
        let candidates = vec![batch(1, Some("2025-01-01"), 20, 0), batch(2, Some("2025-02-01"), 10, 0)];
        let plan = plan_draws(&candidates, 8);

        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.draws[0].batch_id, BatchId::new(1));
        assert_eq!(plan.outstanding, 0);
    }

    #[test]
    fn test_plan_reports_outstanding_shortfall() {
        let candidates = vec![batch(1, Some("2025-01-01"), 5, 0)];
        let plan = plan_draws(&candidates, 12);

        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.draws[0].quantity, 5);
        assert_eq!(plan.outstanding, 7);
    }

    #[test]
    fn test_plan_with_no_candidates() {
        let plan = plan_draws(&[], 12);
        assert!(plan.draws.is_empty());
        assert_eq!(plan.outstanding, 12);
    }

    #[test]
    fn test_synthesized_number_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 12, 30, 45).single().expect("timestamp");
        let first = synthesized_batch_number(Some("yog-500"), "ord-9", "p-1", at);
        let second = synthesized_batch_number(Some("yog-500"), "ord-9", "p-1", at);

        assert_eq!(first, second);
        assert!(first.starts_with("YOG-500-20250304123045-"));
    }

    #[test]
    fn test_synthesized_number_differs_per_order() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 12, 30, 45).single().expect("timestamp");
        let first = synthesized_batch_number(None, "ord-1", "p-1", at);
        let second = synthesized_batch_number(None, "ord-2", "p-1", at);

        assert_ne!(first, second);
        assert!(first.starts_with("LOT-"));
    }

    #[test]
    fn test_synthesized_expiry_adds_shelf_life() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).single().expect("timestamp");
        assert_eq!(
            synthesized_expiry(at, Some(30)),
            Some("2025-01-31".parse().expect("date"))
        );
        assert_eq!(synthesized_expiry(at, None), None);
        assert_eq!(synthesized_expiry(at, Some(-5)), None);
    }

    #[test]
    fn test_synthesized_quantity_covers_shortfall() {
        assert_eq!(synthesized_quantity(Some(100), 12), 100);
        assert_eq!(synthesized_quantity(Some(5), 12), 12);
        assert_eq!(synthesized_quantity(None, 12), 12);
    }
}
