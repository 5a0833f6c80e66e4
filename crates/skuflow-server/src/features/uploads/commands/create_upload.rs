//! Accept a CSV upload and queue its ingestion
//!
//! The file is written under the media root first, then a `PENDING` job is
//! recorded and handed to the dispatcher. If the queue rejects it the job
//! stays `PENDING` and is picked up again by startup recovery.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::{
    store::{JobStore, JobStoreError},
    DispatchError, Dispatcher, MediaRoot,
};

/// Name used when the multipart field carries no file name
pub const FALLBACK_FILE_NAME: &str = "upload.csv";

/// An uploaded CSV file
#[derive(Debug, Clone)]
pub struct CreateUploadCommand {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Body of the `202 Accepted` response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateUploadResponse {
    pub task_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateUploadError {
    #[error("Failed to store upload: {0}")]
    Store(#[from] skuflow_common::SkuflowError),

    #[error("Failed to record upload job: {0}")]
    Job(#[from] JobStoreError),

    #[error("Failed to queue upload job {job_id}: {source}")]
    Dispatch {
        job_id: Uuid,
        #[source]
        source: DispatchError,
    },
}

impl CreateUploadCommand {
    pub fn new(file_name: Option<&str>, content: impl Into<Vec<u8>>) -> Self {
        let file_name = file_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(FALLBACK_FILE_NAME)
            .to_string();

        Self {
            file_name,
            content: content.into(),
        }
    }
}

#[tracing::instrument(skip_all, fields(file_name = %command.file_name, bytes = command.content.len()))]
pub async fn handle(
    media: &MediaRoot,
    jobs: &dyn JobStore,
    dispatcher: &Dispatcher,
    command: CreateUploadCommand,
) -> Result<CreateUploadResponse, CreateUploadError> {
    let input_ref = media
        .store_upload(&command.file_name, &command.content)
        .await?;
    let job = jobs.create(&input_ref).await?;

    dispatcher
        .enqueue(job.id, job.input_ref.clone())
        .await
        .map_err(|source| CreateUploadError::Dispatch {
            job_id: job.id,
            source,
        })?;

    tracing::info!(job_id = %job.id, input_ref = %job.input_ref, "Upload accepted");

    Ok(CreateUploadResponse { task_id: job.id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::ingest::{
        store::{MemoryCatalog, MemoryJobStore},
        DispatchSettings, IngestionDriver,
    };

    #[test]
    fn test_fallback_file_name() {
        assert_eq!(CreateUploadCommand::new(None, "x").file_name, FALLBACK_FILE_NAME);
        assert_eq!(CreateUploadCommand::new(Some("  "), "x").file_name, FALLBACK_FILE_NAME);
        assert_eq!(CreateUploadCommand::new(Some("items.csv"), "x").file_name, "items.csv");
    }

    #[tokio::test]
    async fn test_handle_stores_file_and_creates_job() {
        let dir = tempfile::tempdir().unwrap();
        let media = MediaRoot::new(dir.path());
        let jobs = Arc::new(MemoryJobStore::new());
        let driver = IngestionDriver::new(
            jobs.clone(),
            Arc::new(MemoryCatalog::new()),
            Arc::new(media.clone()),
        );
        let (dispatcher, dispatcher_handle) =
            Dispatcher::start(Arc::new(driver), DispatchSettings::default());

        let command = CreateUploadCommand::new(Some("items.csv"), "sku,name,price\n");
        let response = handle(&media, jobs.as_ref(), &dispatcher, command)
            .await
            .unwrap();

        let job = jobs.fetch(response.task_id).await.unwrap();
        assert!(job.input_ref.starts_with("uploads/"));
        assert!(job.input_ref.ends_with("_items.csv"));
        assert!(media.resolve(&job.input_ref).unwrap().exists());

        dispatcher_handle.shutdown().await;
    }
}
