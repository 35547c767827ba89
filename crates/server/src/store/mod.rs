//! Storage access for the allocation service.
//!
//! The allocation engine never talks to a database handle directly: it is
//! handed a [`Store`], and runs each order inside a [`StoreSession`] - one
//! transaction, committed explicitly, rolled back on drop. This is the seam
//! that lets the engine run against `PostgreSQL` in production
//! ([`PgStore`]) and against an in-memory double in tests ([`MemoryStore`]).
//!
//! # Relations
//!
//! - `products` - external product id -> internal product (lazily created)
//! - `batches` - dated lots with remaining stock
//! - `orders` - processed orders, unique on external id (idempotency guard)
//! - `consumptions` - immutable order/batch consumption facts
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p lotwise-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use lotwise_core::{BatchId, OrderId, ProductId};

use crate::models::{
    AllocationLine, Batch, BatchCorrection, Consumption, NewBatch, NewConsumption, NewOrder,
    Order, Product, TraceRecord,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A batch with this number already exists.
    #[error("batch number already exists: {0}")]
    DuplicateBatchNumber(String),

    /// An order with this external identifier already exists.
    ///
    /// Raised when two deliveries of the same order race; the engine resolves
    /// it by re-reading the winner's outcome.
    #[error("order already recorded: {0}")]
    DuplicateOrder(String),

    /// Referenced product does not exist.
    #[error("unknown product")]
    UnknownProduct,

    /// A decrement would take the batch's remaining quantity below zero.
    ///
    /// Internal to the allocation walk - the engine falls through to the next
    /// candidate batch; this is never surfaced to external callers.
    #[error("insufficient stock in batch")]
    InsufficientStock,

    /// The batch has recorded consumptions and is immutable.
    #[error("batch has recorded consumptions")]
    BatchConsumed,

    /// The batch cannot be deleted because consumptions reference it.
    #[error("batch has consumptions and cannot be deleted")]
    BatchHasConsumptions,

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the enclosing transaction is worth retrying.
    ///
    /// True for `PostgreSQL` serialization failures (40001) and deadlocks
    /// (40P01); the engine retries the whole unit of work a bounded number of
    /// times.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .is_some_and(|code| code == "40001" || code == "40P01"),
            _ => false,
        }
    }
}

/// A unit of work: one transaction against the store.
///
/// Dropped without [`commit`](Self::commit), every effect is rolled back.
#[async_trait]
pub trait StoreSession: Send {
    /// Resolve or lazily create the product for an external identifier.
    ///
    /// Concurrent callers racing to create the same external identifier
    /// converge on one row; the unique constraint, not application code,
    /// closes the race.
    async fn ensure_product(
        &mut self,
        external_id: &str,
        name: Option<&str>,
        sku: Option<&str>,
    ) -> Result<Product, StoreError>;

    /// Batches of a product with remaining stock, in FEFO order:
    /// expiry ascending, undated batches last, ties by creation time.
    async fn fulfillable_batches(&mut self, product_id: ProductId)
    -> Result<Vec<Batch>, StoreError>;

    /// Atomically decrement a batch's remaining quantity.
    ///
    /// Compare-and-decrement: fails with [`StoreError::InsufficientStock`]
    /// when `amount` exceeds what is currently remaining, without writing.
    async fn decrement_batch(&mut self, id: BatchId, amount: i64) -> Result<(), StoreError>;

    /// Insert a batch.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateBatchNumber`] when the number is taken,
    /// [`StoreError::UnknownProduct`] when the product does not exist.
    async fn insert_batch(&mut self, input: &NewBatch) -> Result<Batch, StoreError>;

    /// Look up an order by its external identifier.
    async fn order_by_external_id(&mut self, external_id: &str)
    -> Result<Option<Order>, StoreError>;

    /// Record an order together with its consumptions.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateOrder`] when the external identifier is already
    /// recorded (idempotency race lost).
    async fn insert_order(
        &mut self,
        order: &NewOrder,
        consumptions: &[NewConsumption],
    ) -> Result<Order, StoreError>;

    /// Commit the unit of work.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Storage-access abstraction injected into the allocation engine.
///
/// Pool-level reads and administrative operations live here; everything the
/// engine does transactionally goes through [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError>;

    /// Look up a product by external identifier.
    async fn product_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Product>, StoreError>;

    /// Get a batch by ID.
    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    /// Look up a batch by its batch number.
    async fn batch_by_number(&self, batch_number: &str) -> Result<Option<Batch>, StoreError>;

    /// All batches of a product (by external product id), FEFO order,
    /// including depleted ones.
    async fn list_batches(&self, external_product_id: &str) -> Result<Vec<Batch>, StoreError>;

    /// Administrative correction of expiry/quantity.
    ///
    /// # Errors
    ///
    /// [`StoreError::BatchConsumed`] once any consumption references the
    /// batch - corrected history would corrupt traceability.
    /// [`StoreError::NotFound`] when the batch does not exist.
    async fn update_batch(
        &self,
        id: BatchId,
        correction: &BatchCorrection,
    ) -> Result<Batch, StoreError>;

    /// Delete a batch.
    ///
    /// # Errors
    ///
    /// [`StoreError::BatchHasConsumptions`] when consumptions reference it;
    /// [`StoreError::NotFound`] when it does not exist.
    async fn delete_batch(&self, id: BatchId) -> Result<(), StoreError>;

    /// Look up an order by its external identifier.
    async fn order_by_external_id(&self, external_id: &str)
    -> Result<Option<Order>, StoreError>;

    /// Raw consumption facts for an order.
    async fn consumptions_for_order(&self, id: OrderId) -> Result<Vec<Consumption>, StoreError>;

    /// Allocations of an order, enriched with product/batch identifiers.
    async fn allocations_for_order(&self, id: OrderId)
    -> Result<Vec<AllocationLine>, StoreError>;

    /// Which orders consumed from a batch number, newest order first.
    ///
    /// Returns an empty vec both for an unconsumed batch and for an unknown
    /// batch number - the HTTP boundary distinguishes the two via
    /// [`Store::batch_by_number`].
    async fn orders_for_batch(&self, batch_number: &str) -> Result<Vec<TraceRecord>, StoreError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
