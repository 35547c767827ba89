//! Batch administration handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::instrument;

use lotwise_core::BatchId;

use crate::error::AppError;
use crate::models::{Batch, BatchCorrection, NewBatch};
use crate::state::AppState;
use crate::store::{Store as _, StoreSession as _};

/// Payload for creating a batch.
///
/// The product is referenced by its external identifier; an unseen product is
/// created lazily, same as on the order path.
#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub external_product_id: String,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    pub batch_number: String,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
    pub quantity: i64,
}

/// `POST /api/batches`.
#[instrument(skip(state, request), fields(batch_number = %request.batch_number))]
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<Batch>), AppError> {
    if request.batch_number.trim().is_empty() {
        return Err(AppError::BadRequest("batch number is required".to_string()));
    }
    if request.external_product_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "external product identifier is required".to_string(),
        ));
    }
    if request.quantity < 0 {
        return Err(AppError::BadRequest(
            "quantity must not be negative".to_string(),
        ));
    }

    let mut session = state.store().begin().await?;
    let product = session
        .ensure_product(
            &request.external_product_id,
            request.product_name.as_deref(),
            request.sku.as_deref(),
        )
        .await?;
    let batch = session
        .insert_batch(&NewBatch {
            product_id: product.id,
            batch_number: request.batch_number,
            expires_on: request.expires_on,
            quantity: request.quantity,
        })
        .await?;
    session.commit().await?;

    Ok((StatusCode::CREATED, Json(batch)))
}

/// `GET /api/batches/{id}`.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Batch>, AppError> {
    let batch = state
        .store()
        .get_batch(BatchId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("batch {id}")))?;

    Ok(Json(batch))
}

/// `PATCH /api/batches/{id}` - administrative correction.
///
/// Rejected with a conflict once any order has consumed from the batch.
#[instrument(skip(state, correction))]
pub async fn correct(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(correction): Json<BatchCorrection>,
) -> Result<Json<Batch>, AppError> {
    if correction.is_empty() {
        return Err(AppError::BadRequest("no correction fields".to_string()));
    }
    if correction.quantity.is_some_and(|quantity| quantity < 0) {
        return Err(AppError::BadRequest(
            "quantity must not be negative".to_string(),
        ));
    }

    let batch = state
        .store()
        .update_batch(BatchId::new(id), &correction)
        .await?;

    Ok(Json(batch))
}

/// `DELETE /api/batches/{id}`.
#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.store().delete_batch(BatchId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/products/{external_id}/batches`.
#[instrument(skip(state))]
pub async fn list_for_product(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<Vec<Batch>>, AppError> {
    if state
        .store()
        .product_by_external_id(&external_id)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound(format!("product {external_id}")));
    }

    let batches = state.store().list_batches(&external_id).await?;
    Ok(Json(batches))
}
