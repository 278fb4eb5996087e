use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use dormstore_db::{NewProduct, ProductUpdate};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::super::{
    double_option, map_db_error, map_write_error, products::ProductItem, ApiError, ApiResponse,
    AppState,
};
use super::validate_name;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct AdminListQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct CreateProductRequest {
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Comma-separated size options, e.g. `"S,M,L"`.
    pub size: Option<String>,
    pub color: Option<String>,
    pub image_url: Option<String>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

#[allow(clippy::option_option)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub size: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

pub(super) fn default_active() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/admin/products - `?includeInactive=true` shows hidden products.
pub(in crate::api) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rows = dormstore_db::list_products(
        &state.pool,
        query.category.as_deref(),
        query.include_inactive,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(ProductItem::from).collect(),
        req_id.0,
    )))
}

/// POST /api/admin/products
pub(in crate::api) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductItem>>), ApiError> {
    let rid = &req_id.0;
    let name = validate_name(rid, &body.name)?;

    let row = dormstore_db::create_product(
        &state.pool,
        &NewProduct {
            name,
            price: body.price,
            category: body.category,
            description: body.description,
            size: body.size,
            color: body.color,
            image_url: body.image_url,
            stock: body.stock,
            is_active: body.is_active,
        },
    )
    .await
    .map_err(|e| map_write_error(rid.clone(), &e))?;

    tracing::info!(product_id = row.id, "product created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(ProductItem::from(row), req_id.0)),
    ))
}

/// PUT /api/admin/products/{id} - sparse update; `null` clears optional fields.
pub(in crate::api) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let rid = &req_id.0;
    let name = body
        .name
        .as_deref()
        .map(|n| validate_name(rid, n))
        .transpose()?;

    let row = dormstore_db::update_product(
        &state.pool,
        id,
        &ProductUpdate {
            name,
            price: body.price,
            category: body.category,
            description: body.description,
            size: body.size,
            color: body.color,
            image_url: body.image_url,
            stock: body.stock,
            is_active: body.is_active,
        },
    )
    .await
    .map_err(|e| map_write_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(ProductItem::from(row), req_id.0)))
}

/// DELETE /api/admin/products/{id} - soft delete.
pub(in crate::api) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    dormstore_db::delete_product(&state.pool, id)
        .await
        .map_err(|e| map_write_error(req_id.0.clone(), &e))?;

    tracing::info!(product_id = id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}
