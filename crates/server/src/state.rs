//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::allocation::OrderProcessor;
use crate::config::ServerConfig;
use crate::hints::HttpHintResolver;
use crate::store::{PgStore, Store};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    store: Arc<dyn Store>,
    processor: OrderProcessor,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Wires the `PostgreSQL` store and the HTTP hint resolver into the
    /// allocation engine.
    #[must_use]
    pub fn new(config: ServerConfig, pool: PgPool) -> Self {
        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
        let resolver = Arc::new(HttpHintResolver::new(config.resolver()));
        let processor = OrderProcessor::new(Arc::clone(&store), resolver);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                store,
                processor,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the storage abstraction.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    /// Get a reference to the allocation engine.
    #[must_use]
    pub fn processor(&self) -> &OrderProcessor {
        &self.inner.processor
    }
}
