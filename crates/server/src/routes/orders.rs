//! Order submission handlers: direct API calls and platform webhooks.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::instrument;

use lotwise_core::{LineItem, OrderSubmission};

use super::tenant_from_headers;
use crate::allocation::OrderOutcome;
use crate::error::AppError;
use crate::platform::{self, PlatformOrder};
use crate::state::AppState;

/// Direct order submission payload.
#[derive(Debug, Deserialize)]
pub struct SubmitOrderRequest {
    /// External order identifier - the idempotency key.
    pub external_order_id: String,
    /// Customer label, if known.
    #[serde(default)]
    pub customer: Option<String>,
    /// When the order was placed; defaults to receipt time.
    #[serde(default)]
    pub ordered_at: Option<DateTime<Utc>>,
    /// Line items.
    pub lines: Vec<SubmitLineItem>,
}

/// One line of a direct order submission.
#[derive(Debug, Deserialize)]
pub struct SubmitLineItem {
    pub external_product_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub quantity: i64,
}

impl SubmitOrderRequest {
    fn into_submission(self) -> OrderSubmission {
        OrderSubmission {
            external_order_id: self.external_order_id,
            customer: self.customer,
            ordered_at: self.ordered_at.unwrap_or_else(Utc::now),
            lines: self
                .lines
                .into_iter()
                .map(|line| LineItem {
                    external_product_id: line.external_product_id,
                    name: line.name,
                    sku: line.sku,
                    quantity: line.quantity,
                })
                .collect(),
        }
    }
}

/// `POST /api/orders` - process a direct order submission.
#[instrument(skip(state, headers, request))]
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitOrderRequest>,
) -> Result<Json<OrderOutcome>, AppError> {
    let tenant = tenant_from_headers(&headers)
        .ok_or_else(|| AppError::BadRequest("missing tenant header".to_string()))?;

    let outcome = state
        .processor()
        .process_order(&tenant, request.into_submission())
        .await?;

    Ok(Json(outcome))
}

/// `POST /webhooks/platform/orders` - process a platform webhook delivery.
///
/// The platform redelivers anything that is not acknowledged, and duplicate
/// deliveries are safe (processing is idempotent) while redelivery storms are
/// not. So processing failures are logged - and captured for operators - but
/// still acknowledged with 200. Only an undecodable payload gets a 4xx, via
/// the `Json` extractor rejection.
#[instrument(skip(state, headers, order), fields(platform_order_id = order.id))]
pub async fn platform_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(order): Json<PlatformOrder>,
) -> Response {
    let Some(tenant) = tenant_from_headers(&headers) else {
        tracing::error!("webhook delivery without tenant header; acknowledging anyway");
        return StatusCode::OK.into_response();
    };

    let submission = platform::map_order(order);
    if submission.lines.is_empty() {
        tracing::debug!(
            external_order_id = %submission.external_order_id,
            "webhook order has no allocatable lines, acknowledging"
        );
        return StatusCode::OK.into_response();
    }

    match state.processor().process_order(&tenant, submission).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => {
            let event_id = sentry::capture_error(&err);
            tracing::error!(
                error = %err,
                sentry_event_id = %event_id,
                "webhook order processing failed; acknowledging to avoid redelivery storm"
            );
            StatusCode::OK.into_response()
        }
    }
}
