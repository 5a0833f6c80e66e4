//! Upload job status
//!
//! Read-only view of a job's state, progress and final report.

pub mod queries;
pub mod routes;

pub use routes::jobs_routes;
