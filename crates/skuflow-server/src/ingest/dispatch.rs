//! Background dispatch of ingestion runs
//!
//! Upload handlers enqueue `(job_id, input_ref)` pairs on a bounded channel.
//! A single loop pulls them off and runs each on its own task, at most
//! `concurrency` at a time. Transient failures are retried with exponential
//! backoff; a job id is accepted only once while it is queued or running.

use std::{collections::HashSet, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::{mpsc, Mutex, Semaphore},
    task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    driver::IngestionDriver,
    error::IngestError,
    models::{IngestReport, JobOutcome, RowError, UploadJob},
    store::{JobStore, JobStoreError},
};

/// Exponential backoff with a ceiling.
///
/// Retry `n` (1-based) waits `min(base_delay * 2^(n-1), max_delay)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub concurrency: usize,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
    pub finalize_on_exhaustion: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            queue_capacity: 1024,
            retry: RetryPolicy::default(),
            finalize_on_exhaustion: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Upload job {0} is already queued")]
    AlreadyQueued(Uuid),

    #[error("Ingestion queue is full")]
    QueueFull,

    #[error("Ingestion dispatcher is shut down")]
    Closed,
}

/// One queued run
#[derive(Debug, Clone)]
pub struct IngestTask {
    pub job_id: Uuid,
    pub input_ref: String,
}

/// Report stored when a job runs out of retries.
///
/// Counters committed before the failing batch are kept; every row not
/// upserted counts as failed, and the error itself is appended as a
/// job-level entry.
pub fn exhausted_report(error: &IngestError) -> IngestReport {
    match error.partial_report() {
        Some(partial) => {
            let mut report = partial.clone();
            report.failed_rows = report.total_rows.saturating_sub(report.successful_upserts);
            report.errors.push(RowError::job_level(error.to_string()));
            report
        },
        None => IngestReport::job_failure(error.to_string()),
    }
}

/// Run `task` until it finishes, fails permanently or runs out of retries.
///
/// With `finalize_on_exhaustion` the job is marked `FAILURE` after the last
/// retry; otherwise it stays as the last attempt left it and the error is
/// returned.
#[instrument(skip(driver, task, retry), fields(job_id = %task.job_id))]
pub async fn run_with_retries(
    driver: &IngestionDriver,
    task: &IngestTask,
    retry: &RetryPolicy,
    finalize_on_exhaustion: bool,
) -> Result<UploadJob, IngestError> {
    let mut attempt = 1;
    loop {
        let error = match driver.run(task.job_id, &task.input_ref).await {
            Ok(job) => return Ok(job),
            Err(e) => e,
        };

        if !error.is_retryable() {
            error!(error = %error, "Ingestion failed permanently");
            return Err(error);
        }

        if attempt > retry.max_retries {
            error!(error = %error, attempts = attempt, "Ingestion retries exhausted");
            if !finalize_on_exhaustion {
                return Err(error);
            }
            let report = exhausted_report(&error);
            return Ok(driver
                .jobs()
                .mark_finished(task.job_id, JobOutcome::Failure, &report)
                .await?);
        }

        let delay = retry.delay_for(attempt);
        warn!(
            error = %error,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Ingestion attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Handle for submitting jobs. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<IngestTask>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Owner of the worker loop
pub struct DispatcherHandle {
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop taking queued jobs and wait for running ones to finish.
    /// Jobs still queued stay `PENDING` and are picked up by
    /// [`Dispatcher::recover`] on the next start.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.worker.await {
            error!("Dispatcher loop panicked: {}", e);
        }
    }
}

struct Worker {
    driver: Arc<IngestionDriver>,
    settings: DispatchSettings,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Worker {
    async fn execute(&self, task: IngestTask) {
        match run_with_retries(
            &self.driver,
            &task,
            &self.settings.retry,
            self.settings.finalize_on_exhaustion,
        )
        .await
        {
            Ok(job) => info!(job_id = %job.id, status = %job.status, "Job completed"),
            Err(e) => error!(job_id = %task.job_id, error = %e, "Job not completed"),
        }
        self.in_flight.lock().await.remove(&task.job_id);
    }
}

impl Dispatcher {
    /// Spawn the worker loop
    pub fn start(driver: Arc<IngestionDriver>, settings: DispatchSettings) -> (Self, DispatcherHandle) {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));
        let shutdown = CancellationToken::new();

        let worker = Arc::new(Worker {
            driver,
            settings,
            in_flight: Arc::clone(&in_flight),
        });
        let handle = tokio::spawn(run_loop(receiver, worker, shutdown.clone()));

        info!(
            concurrency = settings.concurrency,
            queue_capacity = settings.queue_capacity,
            "Ingestion dispatcher started"
        );

        (
            Self { sender, in_flight },
            DispatcherHandle {
                shutdown,
                worker: handle,
            },
        )
    }

    /// Queue a run of `job_id`
    pub async fn enqueue(&self, job_id: Uuid, input_ref: impl Into<String>) -> Result<(), DispatchError> {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.contains(&job_id) {
            return Err(DispatchError::AlreadyQueued(job_id));
        }

        let task = IngestTask {
            job_id,
            input_ref: input_ref.into(),
        };
        self.sender.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })?;

        in_flight.insert(job_id);
        Ok(())
    }

    /// Jobs queued or running
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Re-queue every job that never reached a terminal state
    pub async fn recover(&self, jobs: &dyn JobStore) -> Result<usize, JobStoreError> {
        let mut queued = 0;
        for job in jobs.list_unfinished().await? {
            match self.enqueue(job.id, job.input_ref).await {
                Ok(()) => queued += 1,
                Err(e) => warn!(job_id = %job.id, error = %e, "Could not re-queue job"),
            }
        }
        if queued > 0 {
            info!(queued, "Re-queued unfinished upload jobs");
        }
        Ok(queued)
    }
}

async fn run_loop(
    mut receiver: mpsc::Receiver<IngestTask>,
    worker: Arc<Worker>,
    shutdown: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(worker.settings.concurrency.max(1)));
    let mut running = JoinSet::new();

    loop {
        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let task = tokio::select! {
            _ = shutdown.cancelled() => break,
            task = receiver.recv() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let worker = Arc::clone(&worker);
        running.spawn(async move {
            worker.execute(task).await;
            drop(permit);
        });

        while let Some(result) = running.try_join_next() {
            if let Err(e) = result {
                error!("Ingestion task panicked: {}", e);
            }
        }
    }

    receiver.close();
    while let Some(result) = running.join_next().await {
        if let Err(e) = result {
            error!("Ingestion task panicked: {}", e);
        }
    }
    info!("Ingestion dispatcher stopped");
}
