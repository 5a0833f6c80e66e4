//! Upload routes

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};

use super::commands::{create_upload::handle as handle_create_upload, CreateUploadCommand, CreateUploadError};
use crate::{error::AppError, features::FeatureState};

/// Returned when the request carries no usable file part
pub const MISSING_FILE_MESSAGE: &str =
    "CSV file is required (form field name should be 'file' or 'csv').";

pub fn uploads_routes(max_upload_bytes: usize) -> Router<FeatureState> {
    Router::new()
        .route("/bulk-upload", post(bulk_upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Accept a CSV file and queue it for ingestion
///
/// POST /products/bulk-upload (multipart, field `file` or `csv`)
async fn bulk_upload(
    State(state): State<FeatureState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let multipart = multipart.map_err(|_| AppError::BadRequest(MISSING_FILE_MESSAGE.to_string()))?;
    let command = read_upload(multipart)
        .await?
        .ok_or_else(|| AppError::BadRequest(MISSING_FILE_MESSAGE.to_string()))?;

    let response = handle_create_upload(&state.media, state.jobs.as_ref(), &state.dispatcher, command)
        .await
        .map_err(|e| match e {
            CreateUploadError::Store(e) => AppError::Skuflow(e),
            CreateUploadError::Job(e) => AppError::JobStore(e),
            CreateUploadError::Dispatch { job_id, source } => {
                tracing::warn!(%job_id, error = %source, "Upload recorded but not queued");
                AppError::from(source)
            },
        })?;

    Ok((StatusCode::ACCEPTED, Json(response)).into_response())
}

/// Pull the upload out of the form, preferring `file` over `csv`
async fn read_upload(mut multipart: Multipart) -> Result<Option<CreateUploadCommand>, AppError> {
    let mut file = None;
    let mut csv = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        let slot = match field.name() {
            Some("file") if file.is_none() => &mut file,
            Some("csv") if csv.is_none() => &mut csv,
            _ => continue,
        };
        let file_name = field.file_name().map(str::to_string);
        let content = field
            .bytes()
            .await
            .map_err(multipart_error)?;
        *slot = Some(CreateUploadCommand::new(file_name.as_deref(), content.to_vec()));
    }

    Ok(file.or(csv))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}
