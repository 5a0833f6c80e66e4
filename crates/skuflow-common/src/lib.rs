//! SKUFlow Common Library
//!
//! Shared error handling and logging setup for the SKUFlow workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`SkuflowError`] and the [`Result`] alias
//! - **Logging**: [`logging::init_logging`] configures the global `tracing` subscriber
//!
//! # Example
//!
//! ```no_run
//! use skuflow_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("ready");
//!     Ok(())
//! }
//! ```
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;

pub use error::{Result, SkuflowError};
