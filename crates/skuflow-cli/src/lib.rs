//! SKUFlow CLI Library
//!
//! Runs bulk CSV ingestion from the command line and inspects stored jobs.
//!
//! - **Ingest**: `skuflow ingest <FILE>` records a job and runs it to
//!   completion in-process, against PostgreSQL or, with `--dry-run`, in memory
//! - **Status**: `skuflow status <JOB_ID>` prints a stored job
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod commands;
pub mod error;

pub use error::{CliError, Result};

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// SKUFlow - bulk product ingestion
#[derive(Parser, Debug)]
#[command(name = "skuflow")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a CSV file and print the finished job
    Ingest {
        /// CSV file to ingest
        file: PathBuf,

        /// Rows per batch (defaults to INGEST_BATCH_SIZE or 500)
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Keep the job and catalog in memory instead of PostgreSQL
        #[arg(long)]
        dry_run: bool,
    },

    /// Print a stored upload job
    Status {
        /// Upload job id
        job_id: String,
    },
}
