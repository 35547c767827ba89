//! End-to-end allocation engine behavior: FEFO ordering, splitting across
//! batches, synthesis on shortfall, idempotency, and duplicate-delivery
//! races.

use lotwise_integration_tests::{TestContext, submission, tenant};
use lotwise_server::allocation::ProcessError;
use lotwise_server::store::Store as _;

// =============================================================================
// FEFO Allocation
// =============================================================================

/// Scenario A: requesting 8 units splits 5 + 3 across the two batches in
/// expiry order.
#[tokio::test]
async fn test_order_splits_across_batches_in_expiry_order() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", Some("2025-01-01"), 5).await;
    ctx.seed_batch("p-1", "B2", Some("2025-02-01"), 10).await;

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-1", &[("p-1", 8)]))
        .await
        .expect("process");

    assert!(outcome.newly_processed);
    assert!(outcome.shortfalls.is_empty());
    assert_eq!(outcome.lines.len(), 2);
    assert_eq!(outcome.lines[0].batch_number, "B1");
    assert_eq!(outcome.lines[0].quantity, 5);
    assert_eq!(outcome.lines[1].batch_number, "B2");
    assert_eq!(outcome.lines[1].quantity, 3);

    assert_eq!(ctx.batch("B1").await.remaining, 0);
    assert_eq!(ctx.batch("B2").await.remaining, 7);
}

#[tokio::test]
async fn test_earliest_expiry_wins_regardless_of_creation_order() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "LATER", Some("2025-06-01"), 10).await;
    ctx.seed_batch("p-1", "SOONER", Some("2025-04-01"), 10).await;

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-1", &[("p-1", 4)]))
        .await
        .expect("process");

    assert_eq!(outcome.lines.len(), 1);
    assert_eq!(outcome.lines[0].batch_number, "SOONER");
    assert_eq!(ctx.batch("SOONER").await.remaining, 6);
    assert_eq!(ctx.batch("LATER").await.remaining, 10);
}

/// A batch with no expiry date is never chosen while a dated batch has stock.
#[tokio::test]
async fn test_undated_batch_chosen_last() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "UNDATED", None, 10).await;
    ctx.seed_batch("p-1", "DATED", Some("2099-12-31"), 3).await;

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-1", &[("p-1", 5)]))
        .await
        .expect("process");

    assert_eq!(outcome.lines.len(), 2);
    assert_eq!(outcome.lines[0].batch_number, "DATED");
    assert_eq!(outcome.lines[0].quantity, 3);
    assert_eq!(outcome.lines[1].batch_number, "UNDATED");
    assert_eq!(outcome.lines[1].quantity, 2);
}

#[tokio::test]
async fn test_resolver_not_consulted_when_stock_covers() {
    let ctx = TestContext::with_hints(Some(30), Some(100));
    ctx.seed_batch("p-1", "B1", Some("2025-05-01"), 20).await;

    ctx.processor
        .process_order(&tenant(), submission("ord-1", &[("p-1", 8)]))
        .await
        .expect("process");

    assert!(ctx.resolver_calls().is_empty());
}

#[tokio::test]
async fn test_multi_line_order_allocates_each_product() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", Some("2025-05-01"), 10).await;
    ctx.seed_batch("p-2", "B2", Some("2025-05-01"), 10).await;

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-1", &[("p-1", 4), ("p-2", 6)]))
        .await
        .expect("process");

    assert_eq!(outcome.lines.len(), 2);
    assert_eq!(ctx.batch("B1").await.remaining, 6);
    assert_eq!(ctx.batch("B2").await.remaining, 4);
}

// =============================================================================
// Shortfall Synthesis
// =============================================================================

/// Scenario B: no stock at all; resolver hints drive the synthesized batch.
#[tokio::test]
async fn test_synthesis_uses_resolver_hints() {
    let ctx = TestContext::with_hints(Some(30), Some(100));

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-9", &[("p-1", 12)]))
        .await
        .expect("process");

    assert!(outcome.shortfalls.is_empty());
    assert_eq!(outcome.lines.len(), 1);
    assert_eq!(outcome.lines[0].quantity, 12);
    assert_eq!(ctx.resolver_calls(), vec!["p-1".to_string()]);

    // Order date 2025-03-04 + 30 days shelf life.
    let batch = ctx.batch(&outcome.lines[0].batch_number).await;
    assert_eq!(batch.expires_on, Some("2025-04-03".parse().expect("date")));
    assert_eq!(batch.remaining, 88); // synthesized at 100, 12 consumed
}

/// The synthesized batch must cover the shortfall even when the hint is
/// smaller than the outstanding requirement.
#[tokio::test]
async fn test_synthesis_covers_shortfall_when_hint_too_small() {
    let ctx = TestContext::with_hints(None, Some(5));

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-9", &[("p-1", 12)]))
        .await
        .expect("process");

    assert!(outcome.shortfalls.is_empty());
    let batch = ctx.batch(&outcome.lines[0].batch_number).await;
    assert_eq!(batch.remaining, 0); // synthesized at exactly 12
    assert_eq!(batch.expires_on, None);
}

#[tokio::test]
async fn test_synthesis_tops_up_partial_stock() {
    let ctx = TestContext::with_hints(Some(10), Some(100));
    ctx.seed_batch("p-1", "B1", Some("2025-03-10"), 5).await;

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-3", &[("p-1", 12)]))
        .await
        .expect("process");

    assert_eq!(outcome.lines.len(), 2);
    assert_eq!(outcome.lines[0].batch_number, "B1");
    assert_eq!(outcome.lines[0].quantity, 5);
    assert_eq!(outcome.lines[1].quantity, 7);

    let synthesized = ctx.batch(&outcome.lines[1].batch_number).await;
    assert_eq!(synthesized.remaining, 93);
}

/// A dead resolver degrades to "no hints": the order still commits, covered
/// by a batch synthesized at exactly the outstanding amount with no expiry.
#[tokio::test]
async fn test_resolver_failure_never_aborts_order() {
    let ctx = TestContext::without_resolver();

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-4", &[("p-1", 12)]))
        .await
        .expect("process");

    assert!(outcome.shortfalls.is_empty());
    assert_eq!(outcome.lines.len(), 1);
    assert_eq!(outcome.lines[0].quantity, 12);

    let batch = ctx.batch(&outcome.lines[0].batch_number).await;
    assert_eq!(batch.expires_on, None);
    assert_eq!(batch.remaining, 0);
}

// =============================================================================
// Input Validation
// =============================================================================

#[tokio::test]
async fn test_order_with_no_positive_lines_rejected() {
    let ctx = TestContext::without_resolver();

    let result = ctx
        .processor
        .process_order(&tenant(), submission("ord-5", &[("p-1", 0), ("p-2", -3)]))
        .await;

    assert!(matches!(result, Err(ProcessError::InvalidInput(_))));
    assert!(
        ctx.store
            .order_by_external_id("ord-5")
            .await
            .expect("lookup")
            .is_none()
    );
}

#[tokio::test]
async fn test_blank_external_order_id_rejected() {
    let ctx = TestContext::without_resolver();

    let result = ctx
        .processor
        .process_order(&tenant(), submission("  ", &[("p-1", 1)]))
        .await;

    assert!(matches!(result, Err(ProcessError::InvalidInput(_))));
}

#[tokio::test]
async fn test_zero_quantity_lines_filtered_silently() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", Some("2025-05-01"), 10).await;

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-6", &[("p-1", 5), ("p-2", 0)]))
        .await
        .expect("process");

    // Only the positive line allocated; the zero line neither errored nor
    // created product p-2.
    assert_eq!(outcome.lines.len(), 1);
    assert!(
        ctx.store
            .product_by_external_id("p-2")
            .await
            .expect("lookup")
            .is_none()
    );
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn test_replay_returns_recorded_outcome_without_double_decrement() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", Some("2025-05-01"), 10).await;

    let first = ctx
        .processor
        .process_order(&tenant(), submission("ord-7", &[("p-1", 4)]))
        .await
        .expect("first");
    let second = ctx
        .processor
        .process_order(&tenant(), submission("ord-7", &[("p-1", 4)]))
        .await
        .expect("second");

    assert!(first.newly_processed);
    assert!(!second.newly_processed);
    assert_eq!(first.order_id, second.order_id);
    assert_eq!(first.lines.len(), second.lines.len());
    assert_eq!(second.lines[0].batch_number, "B1");
    assert_eq!(second.lines[0].quantity, 4);

    // One decrement, not two.
    assert_eq!(ctx.batch("B1").await.remaining, 6);
}

/// Scenario C: the same external order submitted twice concurrently ends in
/// exactly one order row, one consistent consumption set, and no
/// double-decrement.
#[tokio::test]
async fn test_concurrent_duplicate_deliveries_converge() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", Some("2025-05-01"), 10).await;

    let tenant = tenant();
    let (first, second) = tokio::join!(
        ctx.processor
            .process_order(&tenant, submission("ord-8", &[("p-1", 8)])),
        ctx.processor
            .process_order(&tenant, submission("ord-8", &[("p-1", 8)])),
    );
    let first = first.expect("first");
    let second = second.expect("second");

    assert_eq!(first.order_id, second.order_id);
    assert_eq!(
        usize::from(first.newly_processed) + usize::from(second.newly_processed),
        1,
        "exactly one delivery processes the order"
    );

    let order = ctx
        .store
        .order_by_external_id("ord-8")
        .await
        .expect("lookup")
        .expect("order recorded");
    let consumptions = ctx
        .store
        .consumptions_for_order(order.id)
        .await
        .expect("consumptions");
    let total: i64 = consumptions.iter().map(|c| c.quantity).sum();

    assert_eq!(total, 8);
    assert_eq!(ctx.batch("B1").await.remaining, 2);
}
