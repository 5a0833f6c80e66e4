//! Job status routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use super::queries::{get_job::handle as handle_get_job, GetJobQuery};
use crate::{error::AppError, features::FeatureState};

pub fn jobs_routes() -> Router<FeatureState> {
    Router::new().route("/:task_id/status", get(get_job_status))
}

/// Get the status of an upload job
///
/// GET /tasks/:task_id/status
async fn get_job_status(
    State(state): State<FeatureState>,
    Path(task_id): Path<String>,
) -> Result<Response, AppError> {
    let job_id = Uuid::parse_str(&task_id)
        .map_err(|_| AppError::NotFound(format!("Upload job {task_id} not found")))?;

    let job = handle_get_job(state.jobs.as_ref(), GetJobQuery { job_id }).await?;
    Ok((StatusCode::OK, Json(job)).into_response())
}
