//! Product routes

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use super::queries::{list_products::handle as handle_list_products, ListProductsError, ListProductsQuery};
use crate::{error::AppError, features::FeatureState};

pub fn products_routes() -> Router<FeatureState> {
    Router::new().route("/", get(list_products))
}

/// List catalog entries
///
/// GET /products?page=1&per_page=20
async fn list_products(
    State(state): State<FeatureState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<Response, AppError> {
    let response = handle_list_products(state.catalog.as_ref(), query)
        .await
        .map_err(|e| match e {
            ListProductsError::InvalidPagination(message) => AppError::Validation(message.to_string()),
            ListProductsError::Catalog(e) => AppError::Catalog(e),
        })?;

    Ok((StatusCode::OK, Json(response)).into_response())
}
