//! Unified error handling for the HTTP boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::allocation::ProcessError;
use crate::store::StoreError;

/// Application-level error type for the service.
#[derive(Debug, Error)]
pub enum AppError {
    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ProcessError> for AppError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::InvalidInput(message) => Self::BadRequest(message),
            ProcessError::Store(store) => Self::Store(store),
        }
    }
}

impl AppError {
    /// The HTTP status this error maps to.
    fn status(&self) -> StatusCode {
        match self {
            Self::Store(store) => match store {
                StoreError::DuplicateBatchNumber(_)
                | StoreError::DuplicateOrder(_)
                | StoreError::BatchConsumed
                | StoreError::BatchHasConsumptions => StatusCode::CONFLICT,
                StoreError::UnknownProduct | StoreError::NotFound => StatusCode::NOT_FOUND,
                // InsufficientStock is internal to the allocation walk and
                // must never leak as a client error.
                StoreError::InsufficientStock
                | StoreError::Database(_)
                | StoreError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server errors with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, message).into_response()
    }
}
