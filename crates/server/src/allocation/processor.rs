//! The transactional `ProcessOrder` operation.
//!
//! One invocation is one unit of work: everything runs inside a single store
//! session, committed only when every line item has been handled. Processing
//! is idempotent on the external order identifier - replays and concurrent
//! duplicate deliveries converge on the outcome the first delivery recorded.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use lotwise_core::{LineItem, OrderId, OrderSubmission, ProductHints, Tenant};

use super::planner;
use crate::hints::HintResolver;
use crate::models::{AllocationLine, NewBatch, NewConsumption, NewOrder, Order};
use crate::store::{Store, StoreError, StoreSession};

/// Transaction attempts before giving up on serialization conflicts.
const MAX_TX_ATTEMPTS: u32 = 3;

/// Errors surfaced by order processing.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The submission was rejected before any transaction started.
    #[error("invalid order submission: {0}")]
    InvalidInput(String),

    /// Storage failure; the transaction rolled back with no partial effect.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// An unfulfillable remainder, surfaced to operators rather than failing the
/// order.
///
/// Shortfalls are observability events, not ledger state: a replayed outcome
/// does not reconstruct them.
#[derive(Debug, Clone, Serialize)]
pub struct Shortfall {
    /// Product that could not be covered.
    pub external_product_id: String,
    /// Units left unallocated.
    pub quantity: i64,
}

/// Result of processing one order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderOutcome {
    /// Internal order ID.
    pub order_id: OrderId,
    /// External order identifier.
    pub external_order_id: String,
    /// False when this call replayed an already-recorded order.
    pub newly_processed: bool,
    /// What was consumed from which batch.
    pub lines: Vec<AllocationLine>,
    /// Unfulfillable remainders, if any.
    pub shortfalls: Vec<Shortfall>,
}

/// The batch allocation engine.
///
/// Storage and the metadata resolver are injected as trait objects so the
/// engine runs unchanged against `PostgreSQL` in production and against test
/// doubles in the integration suite.
#[derive(Clone)]
pub struct OrderProcessor {
    store: Arc<dyn Store>,
    resolver: Arc<dyn HintResolver>,
}

impl OrderProcessor {
    /// Create a processor over a store and a resolver.
    pub fn new(store: Arc<dyn Store>, resolver: Arc<dyn HintResolver>) -> Self {
        Self { store, resolver }
    }

    /// Process one inbound order.
    ///
    /// Atomic: either every line item is fully allocated (synthesizing
    /// batches as needed) and the order plus all consumptions are recorded
    /// together, or nothing is. Replaying the same external order identifier
    /// returns the recorded outcome without double-decrementing anything.
    ///
    /// # Errors
    ///
    /// [`ProcessError::InvalidInput`] when the submission has no external id
    /// or no line with positive quantity; [`ProcessError::Store`] when the
    /// transaction fails after retries.
    #[instrument(
        skip(self, submission),
        fields(external_order_id = %submission.external_order_id, tenant = %tenant)
    )]
    pub async fn process_order(
        &self,
        tenant: &Tenant,
        submission: OrderSubmission,
    ) -> Result<OrderOutcome, ProcessError> {
        let submission = submission.sanitized();
        if submission.external_order_id.trim().is_empty() {
            return Err(ProcessError::InvalidInput(
                "external order identifier is required".to_string(),
            ));
        }
        if submission.lines.is_empty() {
            return Err(ProcessError::InvalidInput(
                "no line items with positive quantity".to_string(),
            ));
        }

        // Fast path for replays: no transaction when the order is on record.
        if let Some(order) = self
            .store
            .order_by_external_id(&submission.external_order_id)
            .await?
        {
            return self.replayed_outcome(order).await;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_process(tenant, &submission).await {
                Ok(outcome) => return Ok(outcome),
                Err(ProcessError::Store(StoreError::DuplicateOrder(_))) => {
                    // Lost the idempotency race to a concurrent delivery; the
                    // winner's outcome is the outcome.
                    let order = self
                        .store
                        .order_by_external_id(&submission.external_order_id)
                        .await?
                        .ok_or_else(|| {
                            StoreError::Corrupt(
                                "duplicate order reported but not readable".to_string(),
                            )
                        })?;
                    return self.replayed_outcome(order).await;
                }
                Err(ProcessError::Store(err))
                    if err.is_retryable() && attempt < MAX_TX_ATTEMPTS =>
                {
                    tracing::warn!(attempt, error = %err, "transaction conflict, retrying order");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One transaction attempt.
    async fn try_process(
        &self,
        tenant: &Tenant,
        submission: &OrderSubmission,
    ) -> Result<OrderOutcome, ProcessError> {
        let mut session = self.store.begin().await?;

        // Re-check inside the transaction: a duplicate delivery may have
        // committed between the fast path and here.
        if let Some(order) = session
            .order_by_external_id(&submission.external_order_id)
            .await?
        {
            drop(session);
            return self.replayed_outcome(order).await;
        }

        let mut consumptions = Vec::new();
        let mut lines = Vec::new();
        let mut shortfalls = Vec::new();

        for line in &submission.lines {
            self.allocate_line(
                session.as_mut(),
                tenant,
                submission,
                line,
                &mut consumptions,
                &mut lines,
                &mut shortfalls,
            )
            .await?;
        }

        let order = session
            .insert_order(
                &NewOrder {
                    external_id: submission.external_order_id.clone(),
                    customer: submission.customer.clone(),
                    ordered_at: submission.ordered_at,
                },
                &consumptions,
            )
            .await?;

        session.commit().await?;

        for shortfall in &shortfalls {
            tracing::warn!(
                external_order_id = %submission.external_order_id,
                external_product_id = %shortfall.external_product_id,
                quantity = shortfall.quantity,
                "order committed with unfulfilled shortfall"
            );
        }

        Ok(OrderOutcome {
            order_id: order.id,
            external_order_id: order.external_id,
            newly_processed: true,
            lines,
            shortfalls,
        })
    }

    /// Allocate one line item: walk existing stock in FEFO order, then
    /// synthesize a batch for whatever remains.
    #[allow(clippy::too_many_arguments)]
    async fn allocate_line(
        &self,
        session: &mut dyn StoreSession,
        tenant: &Tenant,
        submission: &OrderSubmission,
        line: &LineItem,
        consumptions: &mut Vec<NewConsumption>,
        lines: &mut Vec<AllocationLine>,
        shortfalls: &mut Vec<Shortfall>,
    ) -> Result<(), StoreError> {
        let product = session
            .ensure_product(
                &line.external_product_id,
                line.name.as_deref(),
                line.sku.as_deref(),
            )
            .await?;

        let candidates = session.fulfillable_batches(product.id).await?;
        let plan = planner::plan_draws(&candidates, line.quantity);
        let mut outstanding = plan.outstanding;

        for draw in plan.draws {
            match session.decrement_batch(draw.batch_id, draw.quantity).await {
                Ok(()) => {
                    consumptions.push(NewConsumption {
                        product_id: product.id,
                        batch_id: draw.batch_id,
                        quantity: draw.quantity,
                    });
                    lines.push(AllocationLine {
                        external_product_id: line.external_product_id.clone(),
                        batch_number: draw.batch_number,
                        quantity: draw.quantity,
                    });
                }
                Err(StoreError::InsufficientStock) => {
                    // A concurrent order drained this batch after our
                    // snapshot; fall through to the remaining candidates or
                    // synthesis.
                    outstanding += draw.quantity;
                }
                Err(err) => return Err(err),
            }
        }

        if outstanding == 0 {
            return Ok(());
        }

        // Only a real shortfall consults the resolver.
        let hints = match self.resolver.resolve(tenant, &line.external_product_id).await {
            Ok(hints) => hints,
            Err(err) => {
                tracing::warn!(
                    external_product_id = %line.external_product_id,
                    error = %err,
                    "metadata resolver unavailable, synthesizing without hints"
                );
                ProductHints::default()
            }
        };

        let sku = line.sku.as_deref().or(product.sku.as_deref());
        let new_batch = NewBatch {
            product_id: product.id,
            batch_number: planner::synthesized_batch_number(
                sku,
                &submission.external_order_id,
                &line.external_product_id,
                submission.ordered_at,
            ),
            expires_on: planner::synthesized_expiry(submission.ordered_at, hints.shelf_life_days),
            quantity: planner::synthesized_quantity(hints.default_batch_quantity, outstanding),
        };

        match session.insert_batch(&new_batch).await {
            Ok(batch) => {
                session.decrement_batch(batch.id, outstanding).await?;
                consumptions.push(NewConsumption {
                    product_id: product.id,
                    batch_id: batch.id,
                    quantity: outstanding,
                });
                lines.push(AllocationLine {
                    external_product_id: line.external_product_id.clone(),
                    batch_number: batch.batch_number.clone(),
                    quantity: outstanding,
                });
                tracing::info!(
                    external_product_id = %line.external_product_id,
                    batch_number = %batch.batch_number,
                    quantity = new_batch.quantity,
                    "synthesized batch to cover shortfall"
                );
                outstanding = 0;
            }
            Err(StoreError::DuplicateBatchNumber(number)) => {
                // Collision on the synthesized number. Tolerated as a
                // shortfall rather than failing the whole order.
                tracing::warn!(batch_number = %number, "synthesized batch number collided");
            }
            Err(err) => return Err(err),
        }

        if outstanding > 0 {
            shortfalls.push(Shortfall {
                external_product_id: line.external_product_id.clone(),
                quantity: outstanding,
            });
        }

        Ok(())
    }

    /// Outcome for an order that is already on record.
    async fn replayed_outcome(&self, order: Order) -> Result<OrderOutcome, ProcessError> {
        let lines = self.store.allocations_for_order(order.id).await?;
        Ok(OrderOutcome {
            order_id: order.id,
            external_order_id: order.external_id,
            newly_processed: false,
            lines,
            shortfalls: Vec::new(),
        })
    }
}
