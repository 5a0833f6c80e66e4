//! In-memory stores
//!
//! Same transition rules as the Postgres stores, kept behind `tokio` locks.
//! Used by `skuflow ingest --dry-run` and by tests, which can also inspect the
//! progress writes of a job and inject commit failures.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CatalogError, CatalogStore, CatalogTransaction, JobStore, JobStoreError};
use crate::ingest::models::{
    CatalogEntry, IngestReport, JobOutcome, JobStatus, UploadJob, ValidatedCandidate,
};

/// Job records held in a map
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, UploadJob>>,
    progress_log: Mutex<HashMap<Uuid, Vec<f64>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress stored by each `set_progress` call for `id`, in order
    pub async fn progress_history(&self, id: Uuid) -> Vec<f64> {
        self.progress_log
            .lock()
            .await
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }
}

fn guard_active(job: &UploadJob, operation: &'static str) -> Result<(), JobStoreError> {
    if job.status.is_terminal() {
        return Err(JobStoreError::InvalidTransition {
            id: job.id,
            from: job.status,
            operation,
        });
    }
    Ok(())
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, input_ref: &str) -> Result<UploadJob, JobStoreError> {
        let job = UploadJob::pending(input_ref);
        self.jobs.lock().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn fetch(&self, id: Uuid) -> Result<UploadJob, JobStoreError> {
        self.jobs
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(JobStoreError::NotFound(id))
    }

    async fn list_unfinished(&self) -> Result<Vec<UploadJob>, JobStoreError> {
        let mut jobs: Vec<_> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.created_at);
        Ok(jobs)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<UploadJob, JobStoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        guard_active(job, "start")?;

        job.status = JobStatus::Processing;
        job.started_at = Some(Utc::now());
        job.finished_at = None;
        job.report = None;
        job.version += 1;
        Ok(job.clone())
    }

    async fn set_progress(&self, id: Uuid, progress: f64) -> Result<(), JobStoreError> {
        let stored = {
            let mut jobs = self.jobs.lock().await;
            let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
            guard_active(job, "update progress of")?;
            job.progress = job.progress.max(progress);
            job.version += 1;
            job.progress
        };
        self.progress_log
            .lock()
            .await
            .entry(id)
            .or_default()
            .push(stored);
        Ok(())
    }

    async fn mark_finished(
        &self,
        id: Uuid,
        outcome: JobOutcome,
        report: &IngestReport,
    ) -> Result<UploadJob, JobStoreError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        guard_active(job, "finish")?;

        job.status = outcome.status();
        job.finished_at = Some(Utc::now());
        job.progress = 100.0;
        job.report = Some(report.clone());
        job.version += 1;
        Ok(job.clone())
    }
}

#[derive(Default)]
struct CatalogState {
    entries: BTreeMap<String, CatalogEntry>,
    next_id: i64,
    /// Commits writing this SKU fail
    poisoned_sku: Option<String>,
}

/// Product catalog held in a map
#[derive(Default, Clone)]
pub struct MemoryCatalog {
    state: Arc<Mutex<CatalogState>>,
    failing_commits: Arc<AtomicUsize>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with [`CatalogError::Commit`]
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Make every commit that writes `sku` fail with [`CatalogError::Commit`]
    pub async fn fail_commits_touching(&self, sku: impl Into<String>) {
        self.state.lock().await.poisoned_sku = Some(sku.into());
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, CatalogError> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            failing_commits: Arc::clone(&self.failing_commits),
            inserts: Vec::new(),
            updates: Vec::new(),
        }))
    }

    async fn find_by_sku(&self, sku: &str) -> Result<Option<CatalogEntry>, CatalogError> {
        Ok(self.state.lock().await.entries.get(sku).cloned())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<CatalogEntry>, i64), CatalogError> {
        let state = self.state.lock().await;
        let mut entries: Vec<_> = state.entries.values().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = entries.len() as i64;
        let page = entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

/// Staged writes applied atomically on commit
struct MemoryTransaction {
    state: Arc<Mutex<CatalogState>>,
    failing_commits: Arc<AtomicUsize>,
    inserts: Vec<ValidatedCandidate>,
    updates: Vec<ValidatedCandidate>,
}

#[async_trait]
impl CatalogTransaction for MemoryTransaction {
    async fn existing_skus(&mut self, skus: &[String]) -> Result<HashSet<String>, CatalogError> {
        let state = self.state.lock().await;
        Ok(skus
            .iter()
            .filter(|sku| state.entries.contains_key(sku.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_entries(&mut self, entries: &[ValidatedCandidate]) -> Result<u64, CatalogError> {
        self.inserts.extend_from_slice(entries);
        Ok(entries.len() as u64)
    }

    async fn update_entries(&mut self, entries: &[ValidatedCandidate]) -> Result<u64, CatalogError> {
        self.updates.extend_from_slice(entries);
        Ok(entries.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), CatalogError> {
        let MemoryTransaction {
            state,
            failing_commits,
            inserts,
            updates,
        } = *self;

        let injected = failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(CatalogError::Commit("injected failure".to_string()));
        }

        let mut state = state.lock().await;
        if let Some(poisoned) = state.poisoned_sku.as_deref() {
            if inserts.iter().chain(&updates).any(|c| c.sku == poisoned) {
                return Err(CatalogError::Commit(format!("write to {poisoned} rejected")));
            }
        }
        if let Some(taken) = inserts
            .iter()
            .find(|candidate| state.entries.contains_key(&candidate.sku))
        {
            return Err(CatalogError::Conflict(taken.sku.clone()));
        }

        let now = Utc::now();
        for candidate in inserts {
            state.next_id += 1;
            let entry = CatalogEntry {
                id: state.next_id,
                sku: candidate.sku.clone(),
                name: candidate.name,
                price: candidate.price,
                stock_count: candidate.stock_count,
                is_active: candidate.is_active,
                created_at: now,
            };
            state.entries.insert(candidate.sku, entry);
        }

        for candidate in updates {
            if let Some(entry) = state.entries.get_mut(&candidate.sku) {
                entry.name = candidate.name;
                entry.price = candidate.price;
                entry.stock_count = candidate.stock_count;
                entry.is_active = candidate.is_active;
            }
        }

        Ok(())
    }
}
