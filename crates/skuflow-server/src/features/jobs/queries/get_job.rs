//! Get upload job query

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::{
    store::{JobStore, JobStoreError},
    IngestReport, JobStatus, UploadJob,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobQuery {
    pub job_id: Uuid,
}

/// Status view of an upload job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDetails {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: f64,
    pub report: Option<IngestReport>,
    /// Stored path of the uploaded file
    pub csv_file: String,
}

impl From<UploadJob> for JobDetails {
    fn from(job: UploadJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            progress: job.progress,
            report: job.report,
            csv_file: job.input_ref,
        }
    }
}

pub async fn handle(jobs: &dyn JobStore, query: GetJobQuery) -> Result<JobDetails, JobStoreError> {
    jobs.fetch(query.job_id).await.map(JobDetails::from)
}
