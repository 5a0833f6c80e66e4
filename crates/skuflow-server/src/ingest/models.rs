//! Data types shared by the ingestion pipeline
//!
//! [`UploadJob`] mirrors a row of the `upload_jobs` table, [`CatalogEntry`] a
//! row of `products`. [`ValidatedCandidate`] and [`RowError`] only live for the
//! duration of a batch; row errors end up in the job's [`IngestReport`].

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};
use uuid::Uuid;

/// One CSV record keyed by header name
pub type RawRow = BTreeMap<String, String>;

/// Lifecycle state of an upload job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Success,
    Failure,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failure => "FAILURE",
        }
    }

    /// Success and Failure accept no further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failure)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILURE" => Ok(JobStatus::Failure),
            other => Err(format!("Unknown job status: {other}")),
        }
    }
}

/// Terminal result passed to `mark_finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Failure,
}

impl JobOutcome {
    pub fn status(self) -> JobStatus {
        match self {
            JobOutcome::Success => JobStatus::Success,
            JobOutcome::Failure => JobStatus::Failure,
        }
    }
}

/// Persistent record of one bulk upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Percentage in `0.0..=100.0`, two decimals
    pub progress: f64,
    pub report: Option<IngestReport>,
    /// Path of the uploaded file relative to the media root
    pub input_ref: String,
    /// Bumped by every mutation
    pub version: i64,
}

impl UploadJob {
    /// A fresh `PENDING` job for `input_ref`
    pub fn pending(input_ref: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            progress: 0.0,
            report: None,
            input_ref: input_ref.into(),
            version: 0,
        }
    }
}

/// Final summary stored on a finished job
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestReport {
    pub total_rows: u64,
    pub successful_upserts: u64,
    pub failed_rows: u64,
    pub errors: Vec<RowError>,
}

impl IngestReport {
    /// Report for a job that failed before any row was looked at
    pub fn job_failure(message: impl Into<String>) -> Self {
        Self {
            total_rows: 0,
            successful_upserts: 0,
            failed_rows: 1,
            errors: vec![RowError::job_level(message)],
        }
    }

    pub fn input_not_found() -> Self {
        Self::job_failure("input not found")
    }
}

/// A row the validator rejected, or a job-level failure when `raw` is `None`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowError {
    pub sku: Option<String>,
    pub error: String,
    pub raw: Option<RawRow>,
}

impl RowError {
    pub fn job_level(message: impl Into<String>) -> Self {
        Self {
            sku: None,
            error: message.into(),
            raw: None,
        }
    }
}

/// A row that passed validation and is ready to upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCandidate {
    pub sku: String,
    pub name: String,
    pub price: BigDecimal,
    pub stock_count: i32,
    pub is_active: bool,
}

/// A product row in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, sqlx::FromRow)]
pub struct CatalogEntry {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub price: BigDecimal,
    pub stock_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
