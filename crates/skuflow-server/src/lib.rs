//! SKUFlow Server Library
//!
//! HTTP service for bulk CSV product ingestion.
//!
//! # Overview
//!
//! - **Uploads**: `POST /api/v1/products/bulk-upload` stores the file and
//!   queues an upload job, answering `202 Accepted` with its id
//! - **Job status**: `GET /api/v1/tasks/:task_id/status`
//! - **Catalog**: `GET /api/v1/products`
//! - **Ingestion**: the [`ingest`] module validates rows, upserts them by SKU
//!   in batches, and records progress and a final report on the job
//!
//! # Architecture
//!
//! HTTP handlers live in feature slices under [`features`], each split into
//! commands (writes) and queries (reads). Ingestion runs in the background on
//! an [`ingest::Dispatcher`], behind the [`ingest::store::JobStore`] and
//! [`ingest::store::CatalogStore`] seams so the same driver runs against
//! PostgreSQL or in memory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use skuflow_server::ingest::{
//!     store::{MemoryCatalog, MemoryJobStore},
//!     IngestionDriver, MediaRoot,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let jobs = Arc::new(MemoryJobStore::new());
//! let media = MediaRoot::new("media");
//! let driver = IngestionDriver::new(jobs.clone(), Arc::new(MemoryCatalog::new()), Arc::new(media));
//!
//! let job = skuflow_server::ingest::store::JobStore::create(jobs.as_ref(), "products.csv").await?;
//! let finished = driver.run(job.id, &job.input_ref).await?;
//! println!("{:?}", finished.report);
//! # Ok(())
//! # }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

pub use error::AppError;
