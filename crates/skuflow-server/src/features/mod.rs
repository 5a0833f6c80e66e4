//! HTTP feature slices
//!
//! Each slice keeps its commands or queries next to its routes:
//!
//! - `uploads` - `POST /products/bulk-upload`
//! - `products` - `GET /products`
//! - `jobs` - `GET /tasks/:task_id/status`

pub mod jobs;
pub mod products;
pub mod shared;
pub mod uploads;

use axum::Router;
use std::sync::Arc;

use crate::ingest::{
    store::{CatalogStore, JobStore},
    Dispatcher, MediaRoot,
};

/// State handed to every feature route
#[derive(Clone)]
pub struct FeatureState {
    pub jobs: Arc<dyn JobStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub dispatcher: Dispatcher,
    /// Where uploads are written
    pub media: MediaRoot,
    pub max_upload_bytes: usize,
}

/// Mount all feature routes
pub fn router(state: FeatureState) -> Router<()> {
    let products = products::products_routes().merge(uploads::uploads_routes(state.max_upload_bytes));

    Router::new()
        .nest("/products", products.with_state(state.clone()))
        .nest("/tasks", jobs::jobs_routes().with_state(state))
}
