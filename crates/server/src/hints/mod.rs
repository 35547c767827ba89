//! Product metadata resolver.
//!
//! On a stock shortfall - and only then - the allocation engine asks the
//! resolver for per-product hints: shelf life and default batch quantity.
//! Both hints are optional; an absent field is "no hint", never an error.
//!
//! The resolver crosses a network boundary mid-transaction, so every call is
//! bounded by a timeout and a failure always degrades to "no hints" in the
//! engine - it never aborts an otherwise-satisfiable order.

pub mod client;

use async_trait::async_trait;
use thiserror::Error;

use lotwise_core::{ProductHints, Tenant};

pub use client::HttpHintResolver;

/// Errors from the resolver transport.
///
/// The engine treats every variant the same way - log and proceed without
/// hints - but the taxonomy matters for operators reading the logs.
#[derive(Debug, Error)]
pub enum HintError {
    /// Network-level failure (connect, timeout, TLS).
    #[error("resolver transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The resolver kept returning a server error after retries.
    #[error("resolver returned {0} after retries")]
    Status(reqwest::StatusCode),

    /// No credential is configured for this tenant.
    #[error("no resolver credential for tenant: {0}")]
    UnknownTenant(String),

    /// The resolver endpoint is not a usable base URL.
    #[error("resolver endpoint is not a valid base URL")]
    InvalidEndpoint,
}

/// Resolves per-product metadata hints for a tenant.
#[async_trait]
pub trait HintResolver: Send + Sync {
    /// Fetch hints for a product under a tenant's credentials.
    async fn resolve(
        &self,
        tenant: &Tenant,
        external_product_id: &str,
    ) -> Result<ProductHints, HintError>;
}
