//! `PostgreSQL` implementation of the storage abstraction.
//!
//! Queries use the runtime sqlx API with explicit row types; every row type
//! maps into a domain model via `From`. The engine's transactional work runs
//! on [`PgSession`], which wraps one `sqlx::Transaction` - dropping the
//! session without committing rolls everything back.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use lotwise_core::{BatchId, OrderId, ProductId};

use super::{Store, StoreError, StoreSession};
use crate::models::{
    AllocationLine, Batch, BatchCorrection, Consumption, NewBatch, NewConsumption, NewOrder,
    Order, Product, TraceRecord,
};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for product queries.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    external_id: String,
    name: String,
    sku: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            external_id: row.external_id,
            name: row.name,
            sku: row.sku,
            created_at: row.created_at,
        }
    }
}

/// Internal row type for batch queries.
#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: i64,
    product_id: i64,
    batch_number: String,
    expires_on: Option<NaiveDate>,
    remaining: i64,
    created_at: DateTime<Utc>,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Self {
            id: BatchId::new(row.id),
            product_id: ProductId::new(row.product_id),
            batch_number: row.batch_number,
            expires_on: row.expires_on,
            remaining: row.remaining,
            created_at: row.created_at,
        }
    }
}

/// Internal row type for order queries.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    external_id: String,
    customer: Option<String>,
    ordered_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Self {
            id: OrderId::new(row.id),
            external_id: row.external_id,
            customer: row.customer,
            ordered_at: row.ordered_at,
            created_at: row.created_at,
        }
    }
}

/// Internal row type for consumption queries.
#[derive(Debug, sqlx::FromRow)]
struct ConsumptionRow {
    id: i64,
    order_id: i64,
    product_id: i64,
    batch_id: i64,
    quantity: i64,
}

impl From<ConsumptionRow> for Consumption {
    fn from(row: ConsumptionRow) -> Self {
        Self {
            id: lotwise_core::ConsumptionId::new(row.id),
            order_id: OrderId::new(row.order_id),
            product_id: ProductId::new(row.product_id),
            batch_id: BatchId::new(row.batch_id),
            quantity: row.quantity,
        }
    }
}

/// Internal row type for enriched allocation queries.
#[derive(Debug, sqlx::FromRow)]
struct AllocationLineRow {
    external_product_id: String,
    batch_number: String,
    quantity: i64,
}

impl From<AllocationLineRow> for AllocationLine {
    fn from(row: AllocationLineRow) -> Self {
        Self {
            external_product_id: row.external_product_id,
            batch_number: row.batch_number,
            quantity: row.quantity,
        }
    }
}

/// Internal row type for traceability queries.
#[derive(Debug, sqlx::FromRow)]
struct TraceRow {
    order_external_id: String,
    customer: Option<String>,
    ordered_at: DateTime<Utc>,
    product_name: String,
    quantity: i64,
}

impl From<TraceRow> for TraceRecord {
    fn from(row: TraceRow) -> Self {
        Self {
            order_external_id: row.order_external_id,
            customer: row.customer,
            ordered_at: row.ordered_at,
            product_name: row.product_name,
            quantity: row.quantity,
        }
    }
}

// =============================================================================
// Shared SQL
// =============================================================================

const BATCH_COLUMNS: &str = "id, product_id, batch_number, expires_on, remaining, created_at";

/// Extract the violated constraint name, if the error carries one.
fn constraint_name(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

/// Map an insert error for the `batches` table onto the store taxonomy.
fn map_batch_insert_error(err: sqlx::Error) -> StoreError {
    match constraint_name(&err) {
        Some("batches_product_id_fkey") => StoreError::UnknownProduct,
        _ => StoreError::Database(err),
    }
}

// =============================================================================
// Store
// =============================================================================

/// `PostgreSQL`-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool (health checks, CLI tooling).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }

    async fn product_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, external_id, name, sku, created_at
             FROM products
             WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn batch_by_number(&self, batch_number: &str) -> Result<Option<Batch>, StoreError> {
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE batch_number = $1"
        ))
        .bind(batch_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_batches(&self, external_product_id: &str) -> Result<Vec<Batch>, StoreError> {
        let rows = sqlx::query_as::<_, BatchRow>(
            "SELECT b.id, b.product_id, b.batch_number, b.expires_on, b.remaining, b.created_at
             FROM batches b
             INNER JOIN products p ON p.id = b.product_id
             WHERE p.external_id = $1
             ORDER BY b.expires_on ASC NULLS LAST, b.created_at ASC, b.id ASC",
        )
        .bind(external_product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_batch(
        &self,
        id: BatchId,
        correction: &BatchCorrection,
    ) -> Result<Batch, StoreError> {
        // The NOT EXISTS guard makes immutability-after-consumption atomic
        // with the write itself.
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "UPDATE batches b
             SET expires_on = COALESCE($2, b.expires_on),
                 remaining = COALESCE($3, b.remaining)
             WHERE b.id = $1
               AND NOT EXISTS (SELECT 1 FROM consumptions c WHERE c.batch_id = b.id)
             RETURNING {BATCH_COLUMNS}"
        ))
        .bind(id.as_i64())
        .bind(correction.expires_on)
        .bind(correction.quantity)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let consumed = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM consumptions WHERE batch_id = $1)",
                )
                .bind(id.as_i64())
                .fetch_one(&self.pool)
                .await?;

                if consumed {
                    Err(StoreError::BatchConsumed)
                } else {
                    Err(StoreError::NotFound)
                }
            }
        }
    }

    async fn delete_batch(&self, id: BatchId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if constraint_name(&e) == Some("consumptions_batch_id_fkey") {
                    StoreError::BatchHasConsumptions
                } else {
                    StoreError::Database(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, external_id, customer, ordered_at, created_at
             FROM orders
             WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn consumptions_for_order(
        &self,
        id: OrderId,
    ) -> Result<Vec<Consumption>, StoreError> {
        let rows = sqlx::query_as::<_, ConsumptionRow>(
            "SELECT id, order_id, product_id, batch_id, quantity
             FROM consumptions
             WHERE order_id = $1
             ORDER BY id ASC",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn allocations_for_order(
        &self,
        id: OrderId,
    ) -> Result<Vec<AllocationLine>, StoreError> {
        let rows = sqlx::query_as::<_, AllocationLineRow>(
            "SELECT p.external_id AS external_product_id, b.batch_number, c.quantity
             FROM consumptions c
             INNER JOIN products p ON p.id = c.product_id
             INNER JOIN batches b ON b.id = c.batch_id
             WHERE c.order_id = $1
             ORDER BY c.id ASC",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn orders_for_batch(
        &self,
        batch_number: &str,
    ) -> Result<Vec<TraceRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TraceRow>(
            "SELECT o.external_id AS order_external_id, o.customer, o.ordered_at,
                    p.name AS product_name, c.quantity
             FROM consumptions c
             INNER JOIN batches b ON b.id = c.batch_id
             INNER JOIN orders o ON o.id = c.order_id
             INNER JOIN products p ON p.id = c.product_id
             WHERE b.batch_number = $1
             ORDER BY o.ordered_at DESC, o.id DESC",
        )
        .bind(batch_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// Session
// =============================================================================

/// One transaction against `PostgreSQL`.
struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreSession for PgSession {
    async fn ensure_product(
        &mut self,
        external_id: &str,
        name: Option<&str>,
        sku: Option<&str>,
    ) -> Result<Product, StoreError> {
        // The no-op DO UPDATE makes RETURNING yield the row on both paths, so
        // racing creators converge on the same product.
        let row = sqlx::query_as::<_, ProductRow>(
            "INSERT INTO products (external_id, name, sku)
             VALUES ($1, $2, $3)
             ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
             RETURNING id, external_id, name, sku, created_at",
        )
        .bind(external_id)
        .bind(name.unwrap_or(external_id))
        .bind(sku)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn fulfillable_batches(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<Batch>, StoreError> {
        let rows = sqlx::query_as::<_, BatchRow>(&format!(
            "SELECT {BATCH_COLUMNS}
             FROM batches
             WHERE product_id = $1 AND remaining > 0
             ORDER BY expires_on ASC NULLS LAST, created_at ASC, id ASC"
        ))
        .bind(product_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn decrement_batch(&mut self, id: BatchId, amount: i64) -> Result<(), StoreError> {
        // Compare-and-decrement: the WHERE guard and the write are one
        // statement, so two orders racing for the last units cannot both win.
        let result = sqlx::query(
            "UPDATE batches
             SET remaining = remaining - $2
             WHERE id = $1 AND remaining >= $2",
        )
        .bind(id.as_i64())
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InsufficientStock);
        }
        Ok(())
    }

    async fn insert_batch(&mut self, input: &NewBatch) -> Result<Batch, StoreError> {
        // ON CONFLICT DO NOTHING instead of catching the unique violation:
        // a constraint error would abort the enclosing transaction, and the
        // engine must be able to continue after a duplicate batch number.
        let row = sqlx::query_as::<_, BatchRow>(&format!(
            "INSERT INTO batches (product_id, batch_number, expires_on, remaining)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (batch_number) DO NOTHING
             RETURNING {BATCH_COLUMNS}"
        ))
        .bind(input.product_id.as_i64())
        .bind(&input.batch_number)
        .bind(input.expires_on)
        .bind(input.quantity)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_batch_insert_error)?;

        row.map_or_else(
            || Err(StoreError::DuplicateBatchNumber(input.batch_number.clone())),
            |row| Ok(row.into()),
        )
    }

    async fn order_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, external_id, customer, ordered_at, created_at
             FROM orders
             WHERE external_id = $1",
        )
        .bind(external_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn insert_order(
        &mut self,
        order: &NewOrder,
        consumptions: &[NewConsumption],
    ) -> Result<Order, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "INSERT INTO orders (external_id, customer, ordered_at)
             VALUES ($1, $2, $3)
             RETURNING id, external_id, customer, ordered_at, created_at",
        )
        .bind(&order.external_id)
        .bind(&order.customer)
        .bind(order.ordered_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if constraint_name(&e) == Some("orders_external_id_key") {
                StoreError::DuplicateOrder(order.external_id.clone())
            } else {
                StoreError::Database(e)
            }
        })?;

        let recorded: Order = row.into();

        for consumption in consumptions {
            sqlx::query(
                "INSERT INTO consumptions (order_id, product_id, batch_id, quantity)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(recorded.id.as_i64())
            .bind(consumption.product_id.as_i64())
            .bind(consumption.batch_id.as_i64())
            .bind(consumption.quantity)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(recorded)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
