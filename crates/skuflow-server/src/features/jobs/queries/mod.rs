//! Upload job queries

pub mod get_job;

pub use get_job::{GetJobQuery, JobDetails};
