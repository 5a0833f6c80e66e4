//! Bulk CSV uploads
//!
//! Accepts a multipart upload, stores it, and answers `202` with the id of
//! the queued job.

pub mod commands;
pub mod routes;

pub use routes::{uploads_routes, MISSING_FILE_MESSAGE};
