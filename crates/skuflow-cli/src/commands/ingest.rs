//! `skuflow ingest` command implementation
//!
//! Records a job for a local CSV file and runs it to completion in-process,
//! with the same retry policy the server's dispatcher uses.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

use skuflow_server::{
    features::jobs::queries::JobDetails,
    ingest::{
        dispatch::{run_with_retries, IngestTask},
        store::{CatalogStore, JobStore, MemoryCatalog, MemoryJobStore, PgCatalogStore, PgJobStore},
        IngestConfig, IngestionDriver, MediaRoot,
    },
};

use crate::error::{CliError, Result};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub file: PathBuf,
    pub batch_size: Option<usize>,
    pub dry_run: bool,
    pub database_url: Option<String>,
}

pub async fn run(options: IngestOptions) -> Result<JobDetails> {
    let config = IngestConfig::from_env().map_err(|e| CliError::Config(e.to_string()))?;
    let (media, input_ref) = locate(&options.file).await?;

    let (jobs, catalog) = if options.dry_run {
        info!("Dry run: job and catalog are kept in memory");
        (
            Arc::new(MemoryJobStore::new()) as Arc<dyn JobStore>,
            Arc::new(MemoryCatalog::new()) as Arc<dyn CatalogStore>,
        )
    } else {
        let pool = super::connect(options.database_url.as_deref()).await?;
        (
            Arc::new(PgJobStore::new(pool.clone())) as Arc<dyn JobStore>,
            Arc::new(PgCatalogStore::new(pool)) as Arc<dyn CatalogStore>,
        )
    };

    let driver = IngestionDriver::new(Arc::clone(&jobs), catalog, Arc::new(media))
        .with_batch_size(options.batch_size.unwrap_or(config.batch_size))
        .with_validator(config.validator());

    let job = jobs.create(&input_ref).await?;
    info!(job_id = %job.id, file = %options.file.display(), "Ingesting");

    let task = IngestTask {
        job_id: job.id,
        input_ref: job.input_ref,
    };
    let finished = run_with_retries(
        &driver,
        &task,
        &config.retry_policy(),
        config.finalize_on_exhaustion,
    )
    .await?;

    Ok(JobDetails::from(finished))
}

/// Serve `file` from its own directory so the reference is just its name
async fn locate(file: &Path) -> Result<(MediaRoot, String)> {
    let not_found = || CliError::FileNotFound(file.display().to_string());

    let metadata = tokio::fs::metadata(file).await.map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }

    let name = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(not_found)?;
    let root = file
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    Ok((MediaRoot::new(root), name.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use skuflow_server::ingest::JobStatus;

    fn dry_run(file: PathBuf) -> IngestOptions {
        IngestOptions {
            file,
            batch_size: Some(1),
            dry_run: true,
            database_url: None,
        }
    }

    #[tokio::test]
    async fn test_dry_run_ingest() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("products.csv");
        std::fs::write(&file, "sku,name,price\nA1,Widget,9.99\n,Bad,1.00\n").unwrap();

        let job = run(dry_run(file)).await.unwrap();

        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.csv_file, "products.csv");
        let report = job.report.unwrap();
        assert_eq!(report.total_rows, 2);
        assert_eq!(report.successful_upserts, 1);
        assert_eq!(report.failed_rows, 1);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(dry_run(dir.path().join("absent.csv"))).await;
        assert!(matches!(result, Err(CliError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(dry_run(dir.path().to_path_buf())).await;
        assert!(matches!(result, Err(CliError::FileNotFound(_))));
    }
}
