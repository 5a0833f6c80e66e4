//! Chunked ingestion driver
//!
//! Runs one upload job end to end: moves the job to `PROCESSING`, counts the
//! rows, then validates and upserts them batch by batch, writing progress
//! after every batch, and finally records the report on the job.
//!
//! Problems with the input itself (missing file, unparsable CSV) finish the
//! job as `FAILURE`. A failed catalog transaction is returned as
//! [`IngestError::Batch`] with the job left in `PROCESSING`, so the caller
//! can retry the whole run.

use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{
    error::IngestError,
    input::{InputError, InputSource},
    models::{IngestReport, JobOutcome, RowError, UploadJob},
    parser::{self, RowReader},
    store::{CatalogStore, JobStore},
    upsert::UpsertEngine,
    validator::RowValidator,
};

/// Rows per batch when not configured
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Percentage of `total` covered by `processed`, rounded to two decimals.
/// Only a finished run reports exactly 100.
pub fn progress_percent(processed: u64, total: u64) -> f64 {
    if total == 0 || processed >= total {
        return 100.0;
    }
    let percent = (processed as f64 / total as f64 * 10_000.0).round() / 100.0;
    percent.min(99.99)
}

/// Running counters of one run
struct Tally {
    total_rows: u64,
    processed: u64,
    successful_upserts: u64,
    failed_rows: u64,
    errors: Vec<RowError>,
}

impl Tally {
    fn new(total_rows: u64) -> Self {
        Self {
            total_rows,
            processed: 0,
            successful_upserts: 0,
            failed_rows: 0,
            errors: Vec::new(),
        }
    }

    fn snapshot(&self) -> IngestReport {
        IngestReport {
            total_rows: self.total_rows,
            successful_upserts: self.successful_upserts,
            failed_rows: self.failed_rows,
            errors: self.errors.clone(),
        }
    }

    fn into_report(self) -> IngestReport {
        IngestReport {
            total_rows: self.total_rows,
            successful_upserts: self.successful_upserts,
            failed_rows: self.failed_rows,
            errors: self.errors,
        }
    }
}

/// Executes ingestion runs against the configured stores
pub struct IngestionDriver {
    jobs: Arc<dyn JobStore>,
    input: Arc<dyn InputSource>,
    engine: UpsertEngine,
    validator: RowValidator,
    batch_size: usize,
}

impl IngestionDriver {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogStore>,
        input: Arc<dyn InputSource>,
    ) -> Self {
        Self {
            jobs,
            input,
            engine: UpsertEngine::new(catalog),
            validator: RowValidator::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Zero is treated as one
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_validator(mut self, validator: RowValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Run job `job_id` over `input_ref` from the start.
    ///
    /// Returns the finished job, or an error when the job could not be brought
    /// to a terminal state.
    #[instrument(skip(self), fields(batch_size = self.batch_size))]
    pub async fn run(&self, job_id: Uuid, input_ref: &str) -> Result<UploadJob, IngestError> {
        self.jobs.fetch(job_id).await?;
        self.jobs.mark_processing(job_id).await?;
        info!("Ingestion started");

        let total_rows = match self.input.open(input_ref).await {
            Ok(stream) => match parser::count_rows(stream).await {
                Ok(total) => total,
                Err(e) => {
                    warn!(error = %e, "Input could not be parsed");
                    let report = IngestReport::job_failure(e.to_string());
                    return self.finish(job_id, JobOutcome::Failure, report).await;
                },
            },
            Err(InputError::NotFound(_)) => {
                warn!("Input not found");
                return self
                    .finish(job_id, JobOutcome::Failure, IngestReport::input_not_found())
                    .await;
            },
            Err(e) => return Err(e.into()),
        };

        if total_rows == 0 {
            info!("Input has no data rows");
            return self
                .finish(job_id, JobOutcome::Success, IngestReport::default())
                .await;
        }

        let mut reader = RowReader::open(self.input.open(input_ref).await?).await?;
        let mut tally = Tally::new(total_rows);
        let mut batch = 0;

        loop {
            let rows = reader.next_batch(self.batch_size).await?;
            if rows.is_empty() {
                break;
            }
            batch += 1;
            let row_count = rows.len() as u64;

            let (candidates, errors) = self.validator.partition(rows);
            let outcome = self
                .engine
                .upsert_batch(candidates)
                .await
                .map_err(|source| IngestError::Batch {
                    batch,
                    source,
                    partial: Box::new(tally.snapshot()),
                })?;

            tally.successful_upserts += outcome.total();
            tally.failed_rows += errors.len() as u64;
            tally.errors.extend(errors);
            tally.processed += row_count;

            let progress = progress_percent(tally.processed, total_rows);
            self.jobs.set_progress(job_id, progress).await?;
            debug!(
                batch,
                created = outcome.created,
                updated = outcome.updated,
                progress,
                "Batch done"
            );
        }

        if tally.processed != total_rows {
            warn!(
                counted = total_rows,
                read = tally.processed,
                "Input changed between passes"
            );
            tally.total_rows = tally.processed;
        }

        self.finish(job_id, JobOutcome::Success, tally.into_report()).await
    }

    async fn finish(
        &self,
        job_id: Uuid,
        outcome: JobOutcome,
        report: IngestReport,
    ) -> Result<UploadJob, IngestError> {
        let job = self.jobs.mark_finished(job_id, outcome, &report).await?;
        info!(
            status = %job.status,
            total_rows = report.total_rows,
            successful_upserts = report.successful_upserts,
            failed_rows = report.failed_rows,
            "Ingestion finished"
        );
        Ok(job)
    }
}
