//! Bulk CSV ingestion
//!
//! An uploaded file becomes an [`UploadJob`](models::UploadJob). The
//! [`Dispatcher`](dispatch::Dispatcher) hands the job to an
//! [`IngestionDriver`](driver::IngestionDriver), which streams the file in
//! batches through the [`RowValidator`](validator::RowValidator) and the
//! [`UpsertEngine`](upsert::UpsertEngine) and records progress and the final
//! report on the job.
//!
//! ```text
//! upload ──> JobStore::create ──> Dispatcher::enqueue
//!                                      │
//!                                      v
//!                  IngestionDriver::run (retried with backoff)
//!                    count rows ─> [batch: validate ─> upsert ─> progress]* ─> finish
//! ```

pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod input;
pub mod models;
pub mod parser;
pub mod store;
pub mod upsert;
pub mod validator;

pub use config::IngestConfig;
pub use dispatch::{DispatchError, DispatchSettings, Dispatcher, DispatcherHandle, RetryPolicy};
pub use driver::IngestionDriver;
pub use error::IngestError;
pub use input::{InMemoryInput, InputSource, MediaRoot};
pub use models::{IngestReport, JobStatus, RowError, UploadJob};
