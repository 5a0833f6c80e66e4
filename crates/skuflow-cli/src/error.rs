//! Error types for the SKUFlow CLI

use thiserror::Error;

use skuflow_server::ingest::{store::JobStoreError, IngestError};

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("File not found: '{0}'. Verify the file path exists and you have read permissions.")]
    FileNotFound(String),

    #[error("Invalid job id '{0}': expected a UUID")]
    InvalidJobId(String),

    #[error("Upload job {0} not found")]
    JobNotFound(uuid::Uuid),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}. Check DATABASE_URL or pass --database-url.")]
    Database(String),

    #[error("Ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("Job store error: {0}")]
    JobStore(JobStoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<JobStoreError> for CliError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => CliError::JobNotFound(id),
            other => CliError::JobStore(other),
        }
    }
}

impl From<skuflow_server::db::DbError> for CliError {
    fn from(err: skuflow_server::db::DbError) -> Self {
        CliError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_job_maps_to_cli_error() {
        let id = uuid::Uuid::new_v4();
        let err = CliError::from(JobStoreError::NotFound(id));
        assert_eq!(err.to_string(), format!("Upload job {id} not found"));
    }
}
