//! List products query
//!
//! Pages through the catalog, newest entries first.

use serde::{Deserialize, Serialize};

use crate::{
    features::shared::{PaginationMetadata, PaginationParams},
    ingest::{
        models::CatalogEntry,
        store::{CatalogError, CatalogStore},
    },
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProductsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListProductsResponse {
    pub data: Vec<CatalogEntry>,
    pub pagination: PaginationMetadata,
}

#[derive(Debug, thiserror::Error)]
pub enum ListProductsError {
    #[error("{0}")]
    InvalidPagination(&'static str),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ListProductsQuery {
    pub fn pagination(&self) -> PaginationParams {
        PaginationParams::new(self.page, self.per_page)
    }

    pub fn validate(&self) -> Result<(), ListProductsError> {
        self.pagination()
            .validate()
            .map_err(ListProductsError::InvalidPagination)
    }
}

pub async fn handle(
    catalog: &dyn CatalogStore,
    query: ListProductsQuery,
) -> Result<ListProductsResponse, ListProductsError> {
    query.validate()?;

    let params = query.pagination();
    let (data, total) = catalog.list(params.per_page(), params.offset()).await?;

    Ok(ListProductsResponse {
        data,
        pagination: PaginationMetadata::from_params(&params, total),
    })
}
