//! `skuflow status` command implementation

use uuid::Uuid;

use skuflow_server::{
    features::jobs::queries::{get_job, GetJobQuery, JobDetails},
    ingest::store::PgJobStore,
};

use crate::error::{CliError, Result};

pub fn parse_job_id(job_id: &str) -> Result<Uuid> {
    Uuid::parse_str(job_id.trim()).map_err(|_| CliError::InvalidJobId(job_id.to_string()))
}

pub async fn run(job_id: &str, database_url: Option<&str>) -> Result<JobDetails> {
    let job_id = parse_job_id(job_id)?;
    let pool = super::connect(database_url).await?;
    let jobs = PgJobStore::new(pool);

    Ok(get_job::handle(&jobs, GetJobQuery { job_id }).await?)
}
