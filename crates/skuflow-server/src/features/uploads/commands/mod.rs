//! Upload commands

pub mod create_upload;

pub use create_upload::{CreateUploadCommand, CreateUploadError, CreateUploadResponse};
