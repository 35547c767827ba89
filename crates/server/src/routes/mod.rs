//! HTTP route handlers.
//!
//! Handlers are deliberately thin: extract the tenant, map the payload into
//! core types, call the engine or the store, translate errors. Bearer-token
//! verification of direct calls and signature verification of webhooks happen
//! upstream - handlers receive the tenant as a trusted header.
//!
//! # Routes
//!
//! - `POST /api/orders` - direct order submission
//! - `POST /webhooks/platform/orders` - platform webhook delivery
//! - `GET /traceability/{batch_number}` - which orders consumed a batch
//! - `POST /api/batches`, `GET|PATCH|DELETE /api/batches/{id}` - batch admin
//! - `GET /api/products/{external_id}/batches` - batches of a product

pub mod batches;
pub mod orders;
pub mod traceability;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use lotwise_core::Tenant;

use crate::state::AppState;

/// Header carrying the (upstream-authenticated) tenant identity.
pub const TENANT_HEADER: &str = "x-lotwise-tenant";

/// Build the application router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(orders::submit))
        .route("/webhooks/platform/orders", post(orders::platform_webhook))
        .route("/traceability/{batch_number}", get(traceability::lookup))
        .route("/api/batches", post(batches::create))
        .route(
            "/api/batches/{id}",
            get(batches::show)
                .patch(batches::correct)
                .delete(batches::remove),
        )
        .route(
            "/api/products/{external_id}/batches",
            get(batches::list_for_product),
        )
}

/// Extract the trusted tenant header, if present and readable.
pub(crate) fn tenant_from_headers(headers: &HeaderMap) -> Option<Tenant> {
    headers
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(Tenant::from)
}
