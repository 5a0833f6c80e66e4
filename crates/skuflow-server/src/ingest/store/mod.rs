//! Persistence seams for the ingestion pipeline
//!
//! The driver only talks to [`JobStore`] and [`CatalogStore`]. Postgres
//! implementations back the server; the in-memory ones back the CLI's
//! `--dry-run` mode and the test suite.

use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use super::models::{CatalogEntry, IngestReport, JobOutcome, JobStatus, UploadJob, ValidatedCandidate};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCatalog, MemoryJobStore};
pub use postgres::{PgCatalogStore, PgJobStore};

/// Errors raised by a [`JobStore`]
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Upload job {0} not found")]
    NotFound(Uuid),

    #[error("Cannot {operation} upload job {id} in state {from}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        operation: &'static str,
    },

    #[error("Corrupt upload job record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by a [`CatalogStore`] or one of its transactions
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("SKU {0} already exists")]
    Conflict(String),

    #[error("Commit failed: {0}")]
    Commit(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable job records with guarded state transitions.
///
/// Every mutator is a single atomic write that bumps `version`. Mutating a
/// terminal job yields [`JobStoreError::InvalidTransition`].
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `PENDING` job
    async fn create(&self, input_ref: &str) -> Result<UploadJob, JobStoreError>;

    async fn fetch(&self, id: Uuid) -> Result<UploadJob, JobStoreError>;

    /// Non-terminal jobs, oldest first
    async fn list_unfinished(&self) -> Result<Vec<UploadJob>, JobStoreError>;

    /// `PENDING|PROCESSING -> PROCESSING`; stamps `started_at`. Progress is
    /// left as is so a retried run never reads lower than the last one.
    async fn mark_processing(&self, id: Uuid) -> Result<UploadJob, JobStoreError>;

    /// Raise progress to `progress`; a lower value leaves it unchanged
    async fn set_progress(&self, id: Uuid, progress: f64) -> Result<(), JobStoreError>;

    /// `-> SUCCESS|FAILURE`; stamps `finished_at`, stores the report, forces
    /// progress to 100
    async fn mark_finished(
        &self,
        id: Uuid,
        outcome: JobOutcome,
        report: &IngestReport,
    ) -> Result<UploadJob, JobStoreError>;
}

/// Product catalog keyed by SKU
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Open a transaction scoped to one batch
    async fn begin(&self) -> Result<Box<dyn CatalogTransaction>, CatalogError>;

    async fn find_by_sku(&self, sku: &str) -> Result<Option<CatalogEntry>, CatalogError>;

    /// Entries newest first, with the total count
    async fn list(&self, limit: i64, offset: i64) -> Result<(Vec<CatalogEntry>, i64), CatalogError>;
}

/// Writes for one batch. Dropping without [`commit`](Self::commit) discards
/// everything.
#[async_trait]
pub trait CatalogTransaction: Send {
    /// The subset of `skus` already present in the catalog
    async fn existing_skus(&mut self, skus: &[String]) -> Result<HashSet<String>, CatalogError>;

    async fn insert_entries(&mut self, entries: &[ValidatedCandidate]) -> Result<u64, CatalogError>;

    /// Overwrite name, price, stock_count and is_active; id and created_at are kept
    async fn update_entries(&mut self, entries: &[ValidatedCandidate]) -> Result<u64, CatalogError>;

    async fn commit(self: Box<Self>) -> Result<(), CatalogError>;
}
