//! Traceability lookups: from a batch number back to every order that
//! consumed it.

use chrono::Duration;

use lotwise_integration_tests::{TestContext, ordered_at, submission, tenant};
use lotwise_server::store::Store;

#[tokio::test]
async fn test_orders_for_batch_newest_first() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", Some("2025-05-01"), 20).await;

    let mut early = submission("ord-early", &[("p-1", 3)]);
    early.ordered_at = ordered_at() - Duration::days(2);
    ctx.processor
        .process_order(&tenant(), early)
        .await
        .expect("early order");

    let late = submission("ord-late", &[("p-1", 5)]);
    ctx.processor
        .process_order(&tenant(), late)
        .await
        .expect("late order");

    let trace = ctx.store.orders_for_batch("B1").await.expect("trace");
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].order_external_id, "ord-late");
    assert_eq!(trace[0].quantity, 5);
    assert_eq!(trace[1].order_external_id, "ord-early");
    assert_eq!(trace[1].quantity, 3);
    assert_eq!(trace[0].customer.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn test_split_order_appears_under_both_batches() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", Some("2025-01-01"), 5).await;
    ctx.seed_batch("p-1", "B2", Some("2025-02-01"), 10).await;

    ctx.processor
        .process_order(&tenant(), submission("ord-1", &[("p-1", 8)]))
        .await
        .expect("process");

    let first = ctx.store.orders_for_batch("B1").await.expect("trace");
    let second = ctx.store.orders_for_batch("B2").await.expect("trace");

    assert_eq!(first.len(), 1);
    assert_eq!(first[0].quantity, 5);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].quantity, 3);
}

/// An existing but never-consumed batch yields an empty sequence - not an
/// error - while a number that was never assigned is distinguishable via the
/// batch lookup, which is exactly what the HTTP boundary does.
#[tokio::test]
async fn test_unconsumed_vs_unknown_batch_number() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", None, 5).await;

    let unconsumed = ctx.store.orders_for_batch("B1").await.expect("trace");
    assert!(unconsumed.is_empty());
    assert!(
        ctx.store
            .batch_by_number("B1")
            .await
            .expect("lookup")
            .is_some()
    );

    let unknown = ctx.store.orders_for_batch("NO-SUCH").await.expect("trace");
    assert!(unknown.is_empty());
    assert!(
        ctx.store
            .batch_by_number("NO-SUCH")
            .await
            .expect("lookup")
            .is_none()
    );
}

#[tokio::test]
async fn test_allocations_for_order_are_enriched() {
    let ctx = TestContext::without_resolver();
    ctx.seed_batch("p-1", "B1", Some("2025-01-01"), 5).await;
    ctx.seed_batch("p-1", "B2", Some("2025-02-01"), 10).await;

    let outcome = ctx
        .processor
        .process_order(&tenant(), submission("ord-1", &[("p-1", 8)]))
        .await
        .expect("process");

    let stored = ctx
        .store
        .allocations_for_order(outcome.order_id)
        .await
        .expect("allocations");

    assert_eq!(stored.len(), outcome.lines.len());
    for (stored_line, outcome_line) in stored.iter().zip(&outcome.lines) {
        assert_eq!(stored_line.external_product_id, outcome_line.external_product_id);
        assert_eq!(stored_line.batch_number, outcome_line.batch_number);
        assert_eq!(stored_line.quantity, outcome_line.quantity);
    }
}
