//! Types shared by the feature slices

pub mod pagination;

pub use pagination::{PaginationMetadata, PaginationParams};
