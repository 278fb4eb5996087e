use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use dormstore_db::{ComponentDetail, PackageItemRow, PackageRow};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::middleware::RequestId;

use super::{map_db_error, products::CatalogQuery, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PackageItem {
    id: i64,
    name: String,
    price: Decimal,
    category: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    stock: i32,
    in_stock: bool,
    is_active: bool,
    is_composite: bool,
    updated_at: DateTime<Utc>,
}

impl From<PackageRow> for PackageItem {
    fn from(row: PackageRow) -> Self {
        Self {
            in_stock: row.is_active && row.stock > 0,
            id: row.id,
            name: row.name,
            price: row.price,
            category: row.category,
            description: row.description,
            image_url: row.image_url,
            stock: row.stock,
            is_active: row.is_active,
            is_composite: row.is_composite,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PackageContentItem {
    product_id: i64,
    product_name: Option<String>,
    quantity: i32,
    product_stock: Option<i32>,
    product_available: bool,
}

impl From<PackageItemRow> for PackageContentItem {
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

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PackageWithItems {
    #[serde(flatten)]
    package: PackageItem,
    items: Vec<PackageContentItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PackageDetailsItem {
    #[serde(flatten)]
    package: PackageItem,
    components: Vec<ComponentDetailItem>,
    resolved_stock: i32,
    binding_product_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ComponentDetailItem {
    product_id: i64,
    product_name: Option<String>,
    quantity: i32,
    product_stock: Option<i32>,
    supports: i32,
}

impl From<ComponentDetail> for ComponentDetailItem {
    fn from(c: ComponentDetail) -> Self {
        Self {
            product_id: c.product_id,
            product_name: c.product_name,
            quantity: c.quantity,
            product_stock: c.product_stock,
            supports: c.supports,
        }
    }
}

pub(super) async fn list_packages(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<ApiResponse<Vec<PackageItem>>>, ApiError> {
    let rows = dormstore_db::list_packages(&state.pool, query.category.as_deref(), false)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        rows.into_iter().map(PackageItem::from).collect(),
        req_id.0,
    )))
}

pub(super) async fn get_package(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PackageWithItems>>, ApiError> {
    let rid = &req_id.0;
    let row = dormstore_db::get_package(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .filter(|p| p.is_active)
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("package {id} not found")))?;

    let items = dormstore_db::list_package_items(&state.pool, id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        PackageWithItems {
            package: PackageItem::from(row),
            items: items.into_iter().map(PackageContentItem::from).collect(),
        },
        req_id.0,
    )))
}

/// GET /api/packages/{id}/details - composition with per-component supply.
pub(super) async fn get_package_details(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PackageDetailsItem>>, ApiError> {
    let rid = &req_id.0;
    let details = match dormstore_db::package_details(&state.pool, id).await {
        Ok(details) if details.package.is_active => details,
        Ok(_) | Err(dormstore_db::DbError::NotFound) => {
            return Err(ApiError::new(
                rid,
                "not_found",
                format!("package {id} not found"),
            ));
        }
        Err(e) => return Err(map_db_error(rid.clone(), &e)),
    };

    Ok(Json(ApiResponse::new(
        PackageDetailsItem {
            package: PackageItem::from(details.package),
            components: details
                .components
                .into_iter()
                .map(ComponentDetailItem::from)
                .collect(),
            resolved_stock: details.resolved_stock,
            binding_product_id: details.binding_product_id,
        },
        req_id.0,
    )))
}
