//! Traceability lookup: which orders consumed a batch.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use tracing::instrument;

use crate::error::AppError;
use crate::models::TraceRecord;
use crate::state::AppState;
use crate::store::Store as _;

/// Traceability response for one batch number.
#[derive(Debug, Serialize)]
pub struct TraceResponse {
    /// The batch number looked up.
    pub batch_number: String,
    /// Orders that consumed from the batch, newest order first.
    pub orders: Vec<TraceRecord>,
}

/// `GET /traceability/{batch_number}`.
///
/// The store returns an empty sequence both for an unconsumed batch and for
/// an unknown batch number; this boundary tells the two apart so callers get
/// a 404 for numbers that were never assigned.
#[instrument(skip(state))]
pub async fn lookup(
    State(state): State<AppState>,
    Path(batch_number): Path<String>,
) -> Result<Json<TraceResponse>, AppError> {
    let orders = state.store().orders_for_batch(&batch_number).await?;

    if orders.is_empty()
        && state.store().batch_by_number(&batch_number).await?.is_none()
    {
        return Err(AppError::NotFound(format!("batch {batch_number}")));
    }

    Ok(Json(TraceResponse {
        batch_number,
        orders,
    }))
}
