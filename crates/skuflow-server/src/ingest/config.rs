//! Ingestion configuration
//!
//! Batch sizing, worker pool, retry policy and validation switches, all read
//! from `INGEST_*` environment variables.

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use super::{
    dispatch::{DispatchSettings, RetryPolicy},
    driver::DEFAULT_BATCH_SIZE,
    validator::RowValidator,
};

/// Default directory holding uploaded files.
pub const DEFAULT_MEDIA_ROOT: &str = "./media";

/// Default number of jobs processed at once.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Default number of jobs waiting for a worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay before the first retry (1 second).
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1_000;

/// Default upper bound on retry delay (30 seconds).
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Default request body limit for uploads (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub media_root: PathBuf,
    pub batch_size: usize,
    pub worker_concurrency: usize,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Mark a job FAILURE with its partial report once retries run out
    pub finalize_on_exhaustion: bool,
    pub allow_negative_stock: bool,
    pub max_upload_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from(DEFAULT_MEDIA_ROOT),
            batch_size: DEFAULT_BATCH_SIZE,
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            finalize_on_exhaustion: true,
            allow_negative_stock: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl IngestConfig {
    /// Load ingestion configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            media_root: std::env::var("INGEST_MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_MEDIA_ROOT)),
            batch_size: env_or("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            worker_concurrency: env_or("INGEST_WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY),
            queue_capacity: env_or("INGEST_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY),
            max_retries: env_or("INGEST_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            retry_base_delay_ms: env_or("INGEST_RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS),
            retry_max_delay_ms: env_or("INGEST_RETRY_MAX_DELAY_MS", DEFAULT_RETRY_MAX_DELAY_MS),
            finalize_on_exhaustion: env_or("INGEST_FINALIZE_ON_EXHAUSTION", true),
            allow_negative_stock: env_or("INGEST_ALLOW_NEGATIVE_STOCK", false),
            max_upload_bytes: env_or("INGEST_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("INGEST_BATCH_SIZE must be greater than 0");
        }
        if self.worker_concurrency == 0 {
            anyhow::bail!("INGEST_WORKER_CONCURRENCY must be greater than 0");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("INGEST_QUEUE_CAPACITY must be greater than 0");
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            anyhow::bail!("INGEST_RETRY_BASE_DELAY_MS cannot exceed INGEST_RETRY_MAX_DELAY_MS");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("INGEST_MAX_UPLOAD_BYTES must be greater than 0");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            concurrency: self.worker_concurrency,
            queue_capacity: self.queue_capacity,
            retry: self.retry_policy(),
            finalize_on_exhaustion: self.finalize_on_exhaustion,
        }
    }

    pub fn validator(&self) -> RowValidator {
        RowValidator::new(self.allow_negative_stock)
    }
}
