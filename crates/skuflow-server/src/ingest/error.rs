//! Errors that escape an ingestion run

use thiserror::Error;
use uuid::Uuid;

use super::{
    input::InputError,
    models::IngestReport,
    parser::ParseError,
    store::{CatalogError, JobStoreError},
};

/// Failure of a driver run that did not end in a terminal job state
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Upload job {0} not found")]
    JobNotFound(Uuid),

    #[error("Job store error: {0}")]
    JobStore(JobStoreError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error("Failed to parse input: {0}")]
    Parse(#[from] ParseError),

    /// A catalog transaction failed; `partial` holds the counters of the
    /// batches committed before it
    #[error("batch {batch} failed: {source}")]
    Batch {
        batch: usize,
        #[source]
        source: CatalogError,
        partial: Box<IngestReport>,
    },
}

impl From<JobStoreError> for IngestError {
    fn from(error: JobStoreError) -> Self {
        match error {
            JobStoreError::NotFound(id) => IngestError::JobNotFound(id),
            other => IngestError::JobStore(other),
        }
    }
}

impl IngestError {
    /// Whether running the job again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::JobNotFound(_) => false,
            IngestError::JobStore(
                JobStoreError::InvalidTransition { .. } | JobStoreError::Corrupt(_),
            ) => false,
            IngestError::JobStore(_) => true,
            IngestError::Input(_) | IngestError::Parse(_) | IngestError::Batch { .. } => true,
        }
    }

    pub fn partial_report(&self) -> Option<&IngestReport> {
        match self {
            IngestError::Batch { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::models::JobStatus;

    #[test]
    fn test_retry_classification() {
        let id = Uuid::new_v4();

        assert!(!IngestError::from(JobStoreError::NotFound(id)).is_retryable());
        assert!(!IngestError::from(JobStoreError::InvalidTransition {
            id,
            from: JobStatus::Success,
            operation: "start",
        })
        .is_retryable());
        assert!(IngestError::from(JobStoreError::Database(sqlx::Error::PoolTimedOut)).is_retryable());
        assert!(IngestError::Input(InputError::Io(std::io::Error::other("disk"))).is_retryable());
    }

    #[test]
    fn test_batch_error_message() {
        let error = IngestError::Batch {
            batch: 3,
            source: CatalogError::Commit("connection reset".to_string()),
            partial: Box::default(),
        };

        assert_eq!(error.to_string(), "batch 3 failed: Commit failed: connection reset");
        assert!(error.is_retryable());
        assert!(error.partial_report().is_some());
    }
}
