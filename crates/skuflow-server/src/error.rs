//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingest::{
    store::{CatalogError, JobStoreError},
    DispatchError,
};

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SKUFlow error: {0}")]
    Skuflow(#[from] skuflow_common::SkuflowError),

    #[error("Job store error: {0}")]
    JobStore(#[from] JobStoreError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::AlreadyQueued(id) => {
                AppError::BadRequest(format!("Upload job {id} is already queued"))
            },
            other => AppError::Unavailable(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A database error occurred".to_string())
            },
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Validation(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::BadRequest(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::PayloadTooLarge(ref message) => (StatusCode::PAYLOAD_TOO_LARGE, message.clone()),
            AppError::Unavailable(ref message) => {
                tracing::warn!("Service unavailable: {}", message);
                (StatusCode::SERVICE_UNAVAILABLE, message.clone())
            },
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            },
            AppError::Io(ref e) => {
                tracing::error!("IO error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "An IO error occurred".to_string())
            },
            AppError::Skuflow(ref e) => {
                tracing::error!("SKUFlow error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            },
            AppError::JobStore(JobStoreError::NotFound(id)) => {
                (StatusCode::NOT_FOUND, format!("Upload job {id} not found"))
            },
            AppError::JobStore(ref e) => {
                tracing::error!("Job store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A job store error occurred".to_string())
            },
            AppError::Catalog(ref e) => {
                tracing::error!("Catalog error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "A catalog error occurred".to_string())
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}
