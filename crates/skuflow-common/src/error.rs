//! Error types shared across SKUFlow crates

use thiserror::Error;

/// Result type alias for SKUFlow operations
pub type Result<T> = std::result::Result<T, SkuflowError>;

/// Errors that are not specific to a single crate
#[derive(Error, Debug)]
pub enum SkuflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input reference: {0}")]
    InvalidReference(String),
}
