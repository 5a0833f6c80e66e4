//! Retry and dispatch tests
//!
//! Commit failures are injected into the in-memory catalog to exercise the
//! retry policy, exhaustion handling and the background dispatcher.

use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use skuflow_server::ingest::{
    dispatch::{run_with_retries, IngestTask},
    store::{CatalogStore, JobStore, MemoryCatalog, MemoryJobStore},
    DispatchError, DispatchSettings, Dispatcher, IngestError, IngestionDriver, InMemoryInput,
    JobStatus, RetryPolicy, UploadJob,
};

const CSV: &str = "sku,name,price\nA,Alpha,1.00\nB,Beta,2.00\nC,Gamma,3.00\n";

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

struct Fixture {
    jobs: Arc<MemoryJobStore>,
    catalog: MemoryCatalog,
    driver: Arc<IngestionDriver>,
}

impl Fixture {
    fn new() -> Self {
        let jobs = Arc::new(MemoryJobStore::new());
        let catalog = MemoryCatalog::new();
        let input = InMemoryInput::new().with_file("products.csv", CSV);
        let driver = IngestionDriver::new(jobs.clone(), Arc::new(catalog.clone()), Arc::new(input))
            .with_batch_size(2);
        Self {
            jobs,
            catalog,
            driver: Arc::new(driver),
        }
    }

    async fn task(&self) -> IngestTask {
        let job = self.jobs.create("products.csv").await.unwrap();
        IngestTask {
            job_id: job.id,
            input_ref: job.input_ref,
        }
    }

    async fn wait_for_terminal(&self, id: Uuid) -> UploadJob {
        for _ in 0..500 {
            let job = self.jobs.fetch(id).await.unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} did not finish");
    }
}

#[tokio::test]
async fn test_retry_recovers_from_transient_failures() {
    let fixture = Fixture::new();
    let task = fixture.task().await;
    fixture.catalog.fail_next_commits(2);

    let job = run_with_retries(&fixture.driver, &task, &fast_retry(3), true)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Success);
    let report = job.report.unwrap();
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.successful_upserts, 3);
    assert!(report.errors.is_empty());
    assert_eq!(fixture.catalog.len().await, 3);
}

#[tokio::test]
async fn test_exhausted_retries_finalize_failure() {
    let fixture = Fixture::new();
    let task = fixture.task().await;
    fixture.catalog.fail_next_commits(usize::MAX);

    let job = run_with_retries(&fixture.driver, &task, &fast_retry(2), true)
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failure);
    assert_eq!(job.progress, 100.0);
    let report = job.report.unwrap();
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.successful_upserts, 0);
    assert_eq!(report.failed_rows, 3);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].error.starts_with("batch 1 failed"));
}

#[tokio::test]
async fn test_exhausted_retries_keep_committed_batches() {
    let jobs = Arc::new(MemoryJobStore::new());
    let catalog = MemoryCatalog::new();
    let input = InMemoryInput::new().with_file(
        "products.csv",
        "sku,name,price\nA,Alpha,1.00\n,NoSku,2.00\nC,Gamma,3.00\nD,Delta,4.00\n",
    );
    let driver = IngestionDriver::new(jobs.clone(), Arc::new(catalog.clone()), Arc::new(input))
        .with_batch_size(2);
    catalog.fail_commits_touching("C").await;

    let job = jobs.create("products.csv").await.unwrap();
    let task = IngestTask {
        job_id: job.id,
        input_ref: job.input_ref,
    };
    let finished = run_with_retries(&driver, &task, &fast_retry(2), true)
        .await
        .unwrap();

    assert_eq!(finished.status, JobStatus::Failure);
    assert_eq!(finished.progress, 100.0);

    let report = finished.report.unwrap();
    assert_eq!(report.total_rows, 4);
    assert_eq!(report.successful_upserts, 1);
    assert_eq!(report.failed_rows, report.total_rows - report.successful_upserts);
    assert_eq!(report.errors.len(), 2);
    assert_eq!(report.errors[0].error, "Missing SKU");
    assert!(report.errors[0].raw.is_some());
    assert!(report.errors[1].error.starts_with("batch 2 failed"));
    assert!(report.errors[1].raw.is_none());

    assert_eq!(catalog.len().await, 1);
    assert!(catalog.find_by_sku("A").await.unwrap().is_some());
}

#[tokio::test]
async fn test_exhausted_retries_can_leave_job_unfinished() {
    let fixture = Fixture::new();
    let task = fixture.task().await;
    fixture.catalog.fail_next_commits(usize::MAX);

    let err = run_with_retries(&fixture.driver, &task, &fast_retry(1), false)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::Batch { .. }));
    let job = fixture.jobs.fetch(task.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(job.report.is_none());
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let fixture = Fixture::new();
    let task = IngestTask {
        job_id: Uuid::new_v4(),
        input_ref: "products.csv".to_string(),
    };
    let slow = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_secs(60),
        max_delay: Duration::from_secs(60),
    };

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        run_with_retries(&fixture.driver, &task, &slow, true),
    )
    .await
    .expect("no backoff for permanent errors");

    assert!(matches!(result, Err(IngestError::JobNotFound(_))));
}

#[tokio::test]
async fn test_dispatcher_runs_queued_jobs() {
    let fixture = Fixture::new();
    let settings = DispatchSettings {
        concurrency: 2,
        retry: fast_retry(3),
        ..DispatchSettings::default()
    };
    let (dispatcher, handle) = Dispatcher::start(fixture.driver.clone(), settings);

    let first = fixture.task().await;
    let second = fixture.task().await;
    dispatcher.enqueue(first.job_id, first.input_ref).await.unwrap();
    dispatcher.enqueue(second.job_id, second.input_ref).await.unwrap();

    for id in [first.job_id, second.job_id] {
        let job = fixture.wait_for_terminal(id).await;
        assert_eq!(job.status, JobStatus::Success);
    }
    assert_eq!(fixture.catalog.len().await, 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_dispatcher_rejects_duplicate_job() {
    let fixture = Fixture::new();
    let (dispatcher, handle) = Dispatcher::start(fixture.driver.clone(), DispatchSettings::default());

    let task = fixture.task().await;
    dispatcher.enqueue(task.job_id, task.input_ref.clone()).await.unwrap();
    let duplicate = dispatcher.enqueue(task.job_id, task.input_ref).await;
    assert!(matches!(duplicate, Err(DispatchError::AlreadyQueued(id)) if id == task.job_id));

    fixture.wait_for_terminal(task.job_id).await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_dispatcher_rejects_work_after_shutdown() {
    let fixture = Fixture::new();
    let (dispatcher, handle) = Dispatcher::start(fixture.driver.clone(), DispatchSettings::default());
    handle.shutdown().await;

    let task = fixture.task().await;
    let result = dispatcher.enqueue(task.job_id, task.input_ref).await;
    assert!(matches!(result, Err(DispatchError::Closed)));
    assert_eq!(dispatcher.in_flight().await, 0);
}

#[tokio::test]
async fn test_recover_requeues_unfinished_jobs() {
    let fixture = Fixture::new();
    let pending = fixture.task().await;
    let interrupted = fixture.task().await;
    fixture.jobs.mark_processing(interrupted.job_id).await.unwrap();
    let done = fixture.task().await;
    fixture.driver.run(done.job_id, &done.input_ref).await.unwrap();

    let settings = DispatchSettings {
        retry: fast_retry(1),
        ..DispatchSettings::default()
    };
    let (dispatcher, handle) = Dispatcher::start(fixture.driver.clone(), settings);

    let queued = dispatcher.recover(fixture.jobs.as_ref()).await.unwrap();
    assert_eq!(queued, 2);

    for id in [pending.job_id, interrupted.job_id] {
        assert_eq!(fixture.wait_for_terminal(id).await.status, JobStatus::Success);
    }

    handle.shutdown().await;
}
