//! Product queries

pub mod list_products;

pub use list_products::{ListProductsError, ListProductsQuery, ListProductsResponse};
