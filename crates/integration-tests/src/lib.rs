//! Integration test harness for Lotwise.
//!
//! Drives the allocation engine end-to-end through the in-memory store and a
//! scripted metadata resolver - no database or network required. The engine
//! code under test is exactly what production runs; only the injected
//! collaborators differ.
//!
//! # Test Categories
//!
//! - `allocation_engine` - `ProcessOrder` semantics: FEFO, splitting,
//!   synthesis, idempotency, concurrency
//! - `batch_admin` - batch corrections and deletion policies
//! - `traceability` - batch -> orders lookups

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use lotwise_core::{LineItem, OrderSubmission, ProductHints, Tenant};
use lotwise_server::allocation::OrderProcessor;
use lotwise_server::hints::{HintError, HintResolver};
use lotwise_server::models::{Batch, NewBatch};
use lotwise_server::store::{MemoryStore, Store, StoreSession as _};

/// What the scripted resolver should do.
#[derive(Debug, Clone, Copy)]
pub enum ResolverScript {
    /// Return these hints.
    Hints(ProductHints),
    /// Fail every call, as an unreachable resolver would.
    Unavailable,
}

/// Scripted resolver double that records which products were asked about.
pub struct ScriptedResolver {
    script: ResolverScript,
    calls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl HintResolver for ScriptedResolver {
    async fn resolve(
        &self,
        tenant: &Tenant,
        external_product_id: &str,
    ) -> Result<ProductHints, HintError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(external_product_id.to_string());

        match self.script {
            ResolverScript::Hints(hints) => Ok(hints),
            ResolverScript::Unavailable => Err(HintError::UnknownTenant(tenant.to_string())),
        }
    }
}

/// Everything a test needs: the store, the engine wired to it, and a view of
/// the resolver traffic.
pub struct TestContext {
    pub store: MemoryStore,
    pub processor: OrderProcessor,
    resolver_calls: Arc<Mutex<Vec<String>>>,
}

impl TestContext {
    /// Context with a scripted resolver.
    #[must_use]
    pub fn new(script: ResolverScript) -> Self {
        let store = MemoryStore::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let resolver = Arc::new(ScriptedResolver {
            script,
            calls: Arc::clone(&calls),
        });
        let processor = OrderProcessor::new(Arc::new(store.clone()), resolver);

        Self {
            store,
            processor,
            resolver_calls: calls,
        }
    }

    /// Context whose resolver returns the given hints.
    #[must_use]
    pub fn with_hints(shelf_life_days: Option<i64>, default_batch_quantity: Option<i64>) -> Self {
        Self::new(ResolverScript::Hints(ProductHints {
            shelf_life_days,
            default_batch_quantity,
        }))
    }

    /// Context whose resolver fails every call.
    #[must_use]
    pub fn without_resolver() -> Self {
        Self::new(ResolverScript::Unavailable)
    }

    /// Products the resolver was asked about, in call order.
    #[must_use]
    pub fn resolver_calls(&self) -> Vec<String> {
        self.resolver_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Seed one batch, creating the product as needed.
    ///
    /// # Panics
    ///
    /// Panics when seeding fails - that is a broken test setup, not a test
    /// outcome.
    pub async fn seed_batch(
        &self,
        external_product_id: &str,
        batch_number: &str,
        expires_on: Option<&str>,
        quantity: i64,
    ) -> Batch {
        let mut session = self.store.begin().await.expect("begin");
        let product = session
            .ensure_product(external_product_id, None, None)
            .await
            .expect("ensure product");
        let batch = session
            .insert_batch(&NewBatch {
                product_id: product.id,
                batch_number: batch_number.to_string(),
                expires_on: expires_on.map(|date| date.parse().expect("expiry date")),
                quantity,
            })
            .await
            .expect("insert batch");
        session.commit().await.expect("commit");
        batch
    }

    /// Current state of a batch, by number.
    ///
    /// # Panics
    ///
    /// Panics when the batch does not exist.
    pub async fn batch(&self, batch_number: &str) -> Batch {
        self.store
            .batch_by_number(batch_number)
            .await
            .expect("lookup")
            .expect("batch exists")
    }
}

/// The tenant used throughout the suites.
#[must_use]
pub fn tenant() -> Tenant {
    Tenant::new("acme")
}

/// Fixed order timestamp so synthesized batch parameters are predictable.
#[must_use]
pub fn ordered_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0)
        .single()
        .expect("timestamp")
}

/// Build a submission of (product, quantity) lines.
#[must_use]
pub fn submission(external_order_id: &str, lines: &[(&str, i64)]) -> OrderSubmission {
    OrderSubmission {
        external_order_id: external_order_id.to_string(),
        customer: Some("Ada Lovelace".to_string()),
        ordered_at: ordered_at(),
        lines: lines
            .iter()
            .map(|(product, quantity)| LineItem {
                external_product_id: (*product).to_string(),
                name: None,
                sku: None,
                quantity: *quantity,
            })
            .collect(),
    }
}
