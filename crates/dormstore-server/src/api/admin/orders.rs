use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use dormstore_core::{OrderStatus, PaymentStatus};
use dormstore_db::{DbError, OrderFilters, OrderRow, TransitionError};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::super::{
    map_db_error,
    orders::{load_order_detail, OrderDetail},
    ApiError, ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct OrderListQuery {
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct StatusRequest {
    pub status: OrderStatus,
}

/// The updated order plus the step an admin would normally take next.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct StatusUpdate {
    #[serde(flatten)]
    pub order: OrderRow,
    pub next_status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(in crate::api) struct PaymentRequest {
    pub payment_status: PaymentStatus,
}

fn parse_filters(request_id: &str, query: OrderListQuery) -> Result<OrderFilters, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| ApiError::new(request_id, "validation_error", e.to_string()))?;
    let payment_status = query
        .payment_status
        .as_deref()
        .map(str::parse::<PaymentStatus>)
        .transpose()
        .map_err(|e| ApiError::new(request_id, "validation_error", e.to_string()))?;

    Ok(OrderFilters {
        status,
        payment_status,
        user_id: query.user_id,
        limit: query.limit,
    })
}

fn map_transition_error(request_id: &str, order_number: &str, error: &TransitionError) -> ApiError {
    match error {
        TransitionError::NotFound => ApiError::new(
            request_id,
            "not_found",
            format!("order {order_number} not found"),
        ),
        TransitionError::Invalid { from, to } => {
            ApiError::new(request_id, "invalid_transition", error.to_string()).with_details(
                serde_json::json!({ "from": from, "to": to }),
            )
        }
        TransitionError::Concurrent => ApiError::new(request_id, "conflict", error.to_string()),
        TransitionError::Corrupt(_) => {
            tracing::error!(order_number, error = %error, "order has unreadable status");
            ApiError::new(request_id, "internal_error", "order status is corrupt")
        }
        TransitionError::Db(e) => map_db_error(request_id.to_owned(), e),
    }
}

/// GET /api/admin/orders - `?status=&paymentStatus=&userId=&limit=`.
pub(in crate::api) async fn list_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<ApiResponse<Vec<OrderRow>>>, ApiError> {
    let filters = parse_filters(&req_id.0, query)?;
    let rows = dormstore_db::list_orders(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(rows, req_id.0)))
}

pub(in crate::api) async fn get_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderDetail>>, ApiError> {
    let rid = &req_id.0;
    let detail = load_order_detail(&state.pool, &order_number)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("order {order_number} not found")))?;

    Ok(Json(ApiResponse::new(detail, req_id.0)))
}

/// PATCH /api/admin/orders/{order_number}/status - forward moves only.
pub(in crate::api) async fn update_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(order_number): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<ApiResponse<StatusUpdate>>, ApiError> {
    let order = dormstore_db::update_order_status(&state.pool, &order_number, body.status)
        .await
        .map_err(|e| map_transition_error(&req_id.0, &order_number, &e))?;

    let update = StatusUpdate {
        order,
        next_status: body.status.next(),
    };
    Ok(Json(ApiResponse::new(update, req_id.0)))
}

pub(in crate::api) async fn update_payment(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(order_number): Path<String>,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<ApiResponse<OrderRow>>, ApiError> {
    let rid = &req_id.0;
    let row = match dormstore_db::set_payment_status(&state.pool, &order_number, body.payment_status)
        .await
    {
        Ok(row) => row,
        Err(DbError::NotFound) => {
            return Err(ApiError::new(
                rid,
                "not_found",
                format!("order {order_number} not found"),
            ));
        }
        Err(e) => return Err(map_db_error(rid.clone(), &e)),
    };

    Ok(Json(ApiResponse::new(row, req_id.0)))
}
