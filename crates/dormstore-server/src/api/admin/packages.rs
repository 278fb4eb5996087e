//! Package write handlers and composition editing.
//!
//! Every composition change resyncs the package's derived stock in the same
//! transaction, so the responses here already carry the new stock.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use dormstore_db::{NewPackage, PackageItemRow, PackageUpdate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::super::{
    double_option, map_db_error, map_write_error, packages::PackageItem, ApiError, ApiResponse,
    AppState,
};
use super::products::{default_active, AdminListQuery};
use super::validate_name;

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct ComponentInput {
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct CreatePackageRequest {
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Only meaningful for standalone packages.
    #[serde(default)]
    pub stock: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub items: Vec<ComponentInput>,
}

#[allow(clippy::option_option)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct UpdatePackageRequest {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ReplaceItemsRequest {
    pub items: Vec<ComponentInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct CompositionResponse {
    package: PackageItem,
    items: Vec<ComponentRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct ComponentRow {
    product_id: i64,
    product_name: Option<String>,
    quantity: i32,
    product_stock: Option<i32>,
    product_available: bool,
}

impl From<PackageItemRow> for ComponentRow {
    fn from(row: PackageItemRow) -> Self {
        Self {
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: row.quantity,
            product_stock: row.product_stock,
            product_available: row.product_available,
        }
    }
}

fn pairs(items: &[ComponentInput]) -> Vec<(i64, i32)> {
    items.iter().map(|c| (c.product_id, c.quantity)).collect()
}

/// Re-reads the package after a composition write and pairs it with its rows.
async fn composition(
    state: &AppState,
    request_id: &str,
    package_id: i64,
    rows: Vec<PackageItemRow>,
) -> Result<CompositionResponse, ApiError> {
    let package = dormstore_db::get_package(&state.pool, package_id)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?
        .ok_or_else(|| {
            ApiError::new(request_id, "not_found", format!("package {package_id} not found"))
        })?;

    Ok(CompositionResponse {
        package: PackageItem::from(package),
        items: rows.into_iter().map(ComponentRow::from).collect(),
    })
}

// ---------------------------------------------------------------------------
// Packages
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_packages(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<AdminListQuery>,
) -> Result<Json<ApiResponse<Vec<PackageItem>>>, ApiError> {
    let rows = dormstore_db::list_packages(
        &state.pool,
        query.category.as_deref(),
        query.include_inactive,
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(PackageItem::from).collect(),
        req_id.0,
    )))
}

/// POST /api/admin/packages - with `items`, the package is composite and
/// `stock` is ignored.
pub(in crate::api) async fn create_package(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<CreatePackageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PackageItem>>), ApiError> {
    let rid = &req_id.0;
    let name = validate_name(rid, &body.name)?;

    let row = dormstore_db::create_package(
        &state.pool,
        &NewPackage {
            name,
            price: body.price,
            category: body.category,
            description: body.description,
            image_url: body.image_url,
            stock: body.stock,
            is_active: body.is_active,
            items: pairs(&body.items),
        },
    )
    .await
    .map_err(|e| map_write_error(rid.clone(), &e))?;

    tracing::info!(
        package_id = row.id,
        composite = row.is_composite,
        "package created"
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(PackageItem::from(row), req_id.0)),
    ))
}

/// PUT /api/admin/packages/{id} - `stock` is rejected for composite packages.
pub(in crate::api) async fn update_package(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePackageRequest>,
) -> Result<Json<ApiResponse<PackageItem>>, ApiError> {
    let rid = &req_id.0;
    let name = body
        .name
        .as_deref()
        .map(|n| validate_name(rid, n))
        .transpose()?;

    let row = dormstore_db::update_package(
        &state.pool,
        id,
        &PackageUpdate {
            name,
            price: body.price,
            category: body.category,
            description: body.description,
            image_url: body.image_url,
            stock: body.stock,
            is_active: body.is_active,
        },
    )
    .await
    .map_err(|e| map_write_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(PackageItem::from(row), req_id.0)))
}

pub(in crate::api) async fn delete_package(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    dormstore_db::delete_package(&state.pool, id)
        .await
        .map_err(|e| map_write_error(req_id.0.clone(), &e))?;

    tracing::info!(package_id = id, "package deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_items(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<CompositionResponse>>, ApiError> {
    let rid = &req_id.0;
    let rows = dormstore_db::list_package_items(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let body = composition(&state, rid, id, rows).await?;
    Ok(Json(ApiResponse::new(body, req_id.0)))
}

/// POST /api/admin/packages/{id}/items - adds a component or sets its quantity.
pub(in crate::api) async fn upsert_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ComponentInput>,
) -> Result<Json<ApiResponse<CompositionResponse>>, ApiError> {
    let rid = &req_id.0;
    let rows = dormstore_db::upsert_package_item(&state.pool, id, body.product_id, body.quantity)
        .await
        .map_err(|e| map_write_error(rid.clone(), &e))?;

    let body = composition(&state, rid, id, rows).await?;
    Ok(Json(ApiResponse::new(body, req_id.0)))
}

/// PUT /api/admin/packages/{id}/items - replaces the whole composition.
pub(in crate::api) async fn replace_items(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<ReplaceItemsRequest>,
) -> Result<Json<ApiResponse<CompositionResponse>>, ApiError> {
    let rid = &req_id.0;
    let rows = dormstore_db::replace_package_items(&state.pool, id, &pairs(&body.items))
        .await
        .map_err(|e| map_write_error(rid.clone(), &e))?;

    let body = composition(&state, rid, id, rows).await?;
    Ok(Json(ApiResponse::new(body, req_id.0)))
}

pub(in crate::api) async fn delete_item(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((id, product_id)): Path<(i64, i64)>,
) -> Result<Json<ApiResponse<CompositionResponse>>, ApiError> {
    let rid = &req_id.0;
    let rows = dormstore_db::delete_package_item(&state.pool, id, product_id)
        .await
        .map_err(|e| map_write_error(rid.clone(), &e))?;

    let body = composition(&state, rid, id, rows).await?;
    Ok(Json(ApiResponse::new(body, req_id.0)))
}
