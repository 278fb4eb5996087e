use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dormstore_core::option_list;
use dormstore_db::ProductRow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ProductItem {
    id: i64,
    name: String,
    price: Decimal,
    category: Option<String>,
    description: Option<String>,
    sizes: Vec<String>,
    colors: Vec<String>,
    image_url: Option<String>,
    stock: i32,
    in_stock: bool,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for ProductItem {
    fn from(row: ProductRow) -> Self {
        Self {
            sizes: option_list(row.size.as_deref()),
            colors: option_list(row.color.as_deref()),
            in_stock: row.is_active && row.stock > 0,
            id: row.id,
            name: row.name,
            price: row.price,
            category: row.category,
            description: row.description,
            image_url: row.image_url,
            stock: row.stock,
            is_active: row.is_active,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CatalogQuery {
    pub category: Option<String>,
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rows = dormstore_db::list_products(&state.pool, query.category.as_deref(), false)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(ProductItem::from).collect(),
        req_id.0,
    )))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let row = dormstore_db::get_product(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .filter(|p| p.is_active)
        .ok_or_else(|| ApiError::new(req_id.0.clone(), "not_found", format!("product {id} not found")))?;

    Ok(Json(ApiResponse::new(ProductItem::from(row), req_id.0)))
}
