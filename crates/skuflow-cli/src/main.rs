//! SKUFlow CLI - Main entry point

use clap::Parser;
use skuflow_cli::{
    commands::{self, ingest::IngestOptions},
    Cli, Commands,
};
use skuflow_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use skuflow_server::{features::jobs::queries::JobDetails, ingest::JobStatus};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // stdout carries the job JSON, logs go to stderr
    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Stderr)
        .log_file_prefix("skuflow-cli")
        .build();
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok().flatten();

    match execute_command(&cli).await {
        Ok(job) => {
            match serde_json::to_string_pretty(&job) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    process::exit(1);
                },
            }
            if job.status == JobStatus::Failure {
                process::exit(1);
            }
        },
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            process::exit(1);
        },
    }
}

async fn execute_command(cli: &Cli) -> skuflow_cli::Result<JobDetails> {
    match &cli.command {
        Commands::Ingest {
            file,
            batch_size,
            dry_run,
        } => {
            commands::ingest::run(IngestOptions {
                file: file.clone(),
                batch_size: *batch_size,
                dry_run: *dry_run,
                database_url: cli.database_url.clone(),
            })
            .await
        },
        Commands::Status { job_id } => {
            commands::status::run(job_id, cli.database_url.as_deref()).await
        },
    }
}
