//! In-memory implementation of the storage abstraction.
//!
//! A test double with the same observable semantics as [`super::PgStore`]:
//! unique constraints on batch numbers and external order identifiers,
//! compare-and-decrement stock guards, and rollback of uncommitted sessions.
//! Sessions apply writes eagerly against the shared state (read-committed
//! visibility, the floor the service assumes) and keep an undo log that is
//! replayed if the session is dropped without committing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use lotwise_core::{BatchId, ConsumptionId, OrderId, ProductId};

use super::{Store, StoreError, StoreSession};
use crate::allocation::planner::fefo_cmp;
use crate::models::{
    AllocationLine, Batch, BatchCorrection, Consumption, NewBatch, NewConsumption, NewOrder,
    Order, Product, TraceRecord,
};

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    products: Vec<Product>,
    batches: Vec<Batch>,
    orders: Vec<Order>,
    consumptions: Vec<Consumption>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Shared in-memory state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

/// Lock the shared state, shrugging off poisoning (a panicked test thread
/// must not wedge every other session).
fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Inverse operations replayed when a session is dropped uncommitted.
enum Undo {
    RemoveProduct(ProductId),
    Credit(BatchId, i64),
    RemoveBatch(BatchId),
    RemoveOrder(OrderId),
}

struct MemorySession {
    inner: Arc<Mutex<Inner>>,
    undo: Vec<Undo>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for undo in self.undo.drain(..).rev() {
            match undo {
                Undo::RemoveProduct(id) => inner.products.retain(|p| p.id != id),
                Undo::Credit(id, amount) => {
                    if let Some(batch) = inner.batches.iter_mut().find(|b| b.id == id) {
                        batch.remaining += amount;
                    }
                }
                Undo::RemoveBatch(id) => inner.batches.retain(|b| b.id != id),
                Undo::RemoveOrder(id) => {
                    inner.orders.retain(|o| o.id != id);
                    inner.consumptions.retain(|c| c.order_id != id);
                }
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreSession>, StoreError> {
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
            undo: Vec::new(),
        }))
    }

    async fn product_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Product>, StoreError> {
        Ok(self
            .lock()
            .products
            .iter()
            .find(|p| p.external_id == external_id)
            .cloned())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        Ok(self.lock().batches.iter().find(|b| b.id == id).cloned())
    }

    async fn batch_by_number(&self, batch_number: &str) -> Result<Option<Batch>, StoreError> {
        Ok(self
            .lock()
            .batches
            .iter()
            .find(|b| b.batch_number == batch_number)
            .cloned())
    }

    async fn list_batches(&self, external_product_id: &str) -> Result<Vec<Batch>, StoreError> {
        let inner = self.lock();
        let Some(product) = inner
            .products
            .iter()
            .find(|p| p.external_id == external_product_id)
        else {
            return Ok(Vec::new());
        };

        let mut batches: Vec<Batch> = inner
            .batches
            .iter()
            .filter(|b| b.product_id == product.id)
            .cloned()
            .collect();
        batches.sort_by(fefo_cmp);
        Ok(batches)
    }

    async fn update_batch(
        &self,
        id: BatchId,
        correction: &BatchCorrection,
    ) -> Result<Batch, StoreError> {
        let mut inner = self.lock();
        if inner.consumptions.iter().any(|c| c.batch_id == id) {
            return Err(StoreError::BatchConsumed);
        }
        let batch = inner
            .batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StoreError::NotFound)?;

        if let Some(expires_on) = correction.expires_on {
            batch.expires_on = Some(expires_on);
        }
        if let Some(quantity) = correction.quantity {
            batch.remaining = quantity;
        }
        Ok(batch.clone())
    }

    async fn delete_batch(&self, id: BatchId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.consumptions.iter().any(|c| c.batch_id == id) {
            return Err(StoreError::BatchHasConsumptions);
        }
        let before = inner.batches.len();
        inner.batches.retain(|b| b.id != id);
        if inner.batches.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        Ok(self
            .lock()
            .orders
            .iter()
            .find(|o| o.external_id == external_id)
            .cloned())
    }

    async fn consumptions_for_order(
        &self,
        id: OrderId,
    ) -> Result<Vec<Consumption>, StoreError> {
        Ok(self
            .lock()
            .consumptions
            .iter()
            .filter(|c| c.order_id == id)
            .cloned()
            .collect())
    }

    async fn allocations_for_order(
        &self,
        id: OrderId,
    ) -> Result<Vec<AllocationLine>, StoreError> {
        let inner = self.lock();
        let mut lines = Vec::new();
        for consumption in inner.consumptions.iter().filter(|c| c.order_id == id) {
            let product = inner
                .products
                .iter()
                .find(|p| p.id == consumption.product_id)
                .ok_or_else(|| StoreError::Corrupt("consumption without product".to_string()))?;
            let batch = inner
                .batches
                .iter()
                .find(|b| b.id == consumption.batch_id)
                .ok_or_else(|| StoreError::Corrupt("consumption without batch".to_string()))?;
            lines.push(AllocationLine {
                external_product_id: product.external_id.clone(),
                batch_number: batch.batch_number.clone(),
                quantity: consumption.quantity,
            });
        }
        Ok(lines)
    }

    async fn orders_for_batch(
        &self,
        batch_number: &str,
    ) -> Result<Vec<TraceRecord>, StoreError> {
        let inner = self.lock();
        let Some(batch) = inner
            .batches
            .iter()
            .find(|b| b.batch_number == batch_number)
        else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for consumption in inner.consumptions.iter().filter(|c| c.batch_id == batch.id) {
            let order = inner
                .orders
                .iter()
                .find(|o| o.id == consumption.order_id)
                .ok_or_else(|| StoreError::Corrupt("consumption without order".to_string()))?;
            let product = inner
                .products
                .iter()
                .find(|p| p.id == consumption.product_id)
                .ok_or_else(|| StoreError::Corrupt("consumption without product".to_string()))?;
            records.push(TraceRecord {
                order_external_id: order.external_id.clone(),
                customer: order.customer.clone(),
                ordered_at: order.ordered_at,
                product_name: product.name.clone(),
                quantity: consumption.quantity,
            });
        }
        records.sort_by(|a, b| b.ordered_at.cmp(&a.ordered_at));
        Ok(records)
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn ensure_product(
        &mut self,
        external_id: &str,
        name: Option<&str>,
        sku: Option<&str>,
    ) -> Result<Product, StoreError> {
        let mut inner = lock(&self.inner);
        if let Some(product) = inner.products.iter().find(|p| p.external_id == external_id) {
            return Ok(product.clone());
        }

        let product = Product {
            id: ProductId::new(inner.next_id()),
            external_id: external_id.to_string(),
            name: name.unwrap_or(external_id).to_string(),
            sku: sku.map(ToString::to_string),
            created_at: Utc::now(),
        };
        inner.products.push(product.clone());
        self.undo.push(Undo::RemoveProduct(product.id));
        Ok(product)
    }

    async fn fulfillable_batches(
        &mut self,
        product_id: ProductId,
    ) -> Result<Vec<Batch>, StoreError> {
        let inner = lock(&self.inner);
        let mut batches: Vec<Batch> = inner
            .batches
            .iter()
            .filter(|b| b.product_id == product_id && b.remaining > 0)
            .cloned()
            .collect();
        // Stable sort keeps insertion (id) order for full ties.
        batches.sort_by(fefo_cmp);
        Ok(batches)
    }

    async fn decrement_batch(&mut self, id: BatchId, amount: i64) -> Result<(), StoreError> {
        let mut inner = lock(&self.inner);
        let batch = inner
            .batches
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StoreError::InsufficientStock)?;
        if batch.remaining < amount {
            return Err(StoreError::InsufficientStock);
        }
        batch.remaining -= amount;
        self.undo.push(Undo::Credit(id, amount));
        Ok(())
    }

    async fn insert_batch(&mut self, input: &NewBatch) -> Result<Batch, StoreError> {
        let mut inner = lock(&self.inner);
        if inner
            .batches
            .iter()
            .any(|b| b.batch_number == input.batch_number)
        {
            return Err(StoreError::DuplicateBatchNumber(input.batch_number.clone()));
        }
        if !inner.products.iter().any(|p| p.id == input.product_id) {
            return Err(StoreError::UnknownProduct);
        }

        let batch = Batch {
            id: BatchId::new(inner.next_id()),
            product_id: input.product_id,
            batch_number: input.batch_number.clone(),
            expires_on: input.expires_on,
            remaining: input.quantity,
            created_at: Utc::now(),
        };
        inner.batches.push(batch.clone());
        self.undo.push(Undo::RemoveBatch(batch.id));
        Ok(batch)
    }

    async fn order_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        Ok(lock(&self.inner)
            .orders
            .iter()
            .find(|o| o.external_id == external_id)
            .cloned())
    }

    async fn insert_order(
        &mut self,
        order: &NewOrder,
        consumptions: &[NewConsumption],
    ) -> Result<Order, StoreError> {
        let mut inner = lock(&self.inner);
        if inner
            .orders
            .iter()
            .any(|o| o.external_id == order.external_id)
        {
            return Err(StoreError::DuplicateOrder(order.external_id.clone()));
        }

        let recorded = Order {
            id: OrderId::new(inner.next_id()),
            external_id: order.external_id.clone(),
            customer: order.customer.clone(),
            ordered_at: order.ordered_at,
            created_at: Utc::now(),
        };
        inner.orders.push(recorded.clone());

        for consumption in consumptions {
            let id = ConsumptionId::new(inner.next_id());
            inner.consumptions.push(Consumption {
                id,
                order_id: recorded.id,
                product_id: consumption.product_id,
                batch_id: consumption.batch_id,
                quantity: consumption.quantity,
            });
        }
        self.undo.push(Undo::RemoveOrder(recorded.id));
        Ok(recorded)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        // Writes were applied eagerly; committing just disarms the undo log.
        self.undo.clear();
        Ok(())
    }
}
