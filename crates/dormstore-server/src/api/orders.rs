use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use dormstore_core::{ShippingInfo, ShippingMethod};
use dormstore_db::{
    BalanceRow, Buyer, CheckoutError, CheckoutRequest, DbError, OrderItemRow, OrderLineInput,
    OrderPackageRow, OrderRow, PlacedOrder,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::middleware::{Identity, RequestId};

use super::{cart::GuestLineInput, map_db_error, require_user, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PlaceOrderBody {
    shipping_info: ShippingInfo,
    shipping_method: String,
    #[serde(default)]
    payment_method: Option<String>,
    /// Guest lines; ignored for signed-in users, whose server cart is used.
    #[serde(default)]
    cart_items: Vec<GuestLineInput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderRow,
    pub items: Vec<OrderItemRow>,
    pub packages: Vec<OrderPackageRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PlaceOrderResponse {
    order: OrderDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<BalanceRow>,
}

impl From<PlacedOrder> for PlaceOrderResponse {
    fn from(placed: PlacedOrder) -> Self {
        Self {
            order: OrderDetail {
                order: placed.order,
                items: placed.items,
                packages: placed.packages,
            },
            balance: placed.balance,
        }
    }
}

/// Loads an order with its item and package lines.
pub(super) async fn load_order_detail(
    pool: &PgPool,
    order_number: &str,
) -> Result<Option<OrderDetail>, DbError> {
    let Some(order) = dormstore_db::get_order_by_number(pool, order_number).await? else {
        return Ok(None);
    };
    let items = dormstore_db::list_order_items(pool, order.id).await?;
    let packages = dormstore_db::list_order_packages(pool, order.id).await?;
    Ok(Some(OrderDetail {
        order,
        items,
        packages,
    }))
}

fn map_checkout_error(request_id: &str, error: &CheckoutError) -> ApiError {
    match error {
        CheckoutError::EmptyCart
        | CheckoutError::InvalidLine(_)
        | CheckoutError::InvalidShipping(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        CheckoutError::InsufficientStock(lines) => {
            ApiError::new(request_id, "insufficient_stock", error.to_string())
                .with_details(serde_json::json!({ "lines": lines }))
        }
        CheckoutError::InsufficientFunds {
            shortfall,
            current_balance,
            total,
        } => ApiError::new(request_id, "insufficient_funds", error.to_string()).with_details(
            serde_json::json!({
                "shortfall": shortfall,
                "currentBalance": current_balance,
                "total": total,
            }),
        ),
        CheckoutError::PersistenceFailed(e) => {
            tracing::error!(error = %e, "order transaction failed");
            ApiError::new(
                request_id,
                "order_persistence_failed",
                "the order could not be saved; nothing was charged, please retry",
            )
        }
    }
}

fn build_request(
    request_id: &str,
    identity: &Identity,
    body: PlaceOrderBody,
) -> Result<CheckoutRequest, ApiError> {
    let shipping_method: ShippingMethod = body
        .shipping_method
        .parse()
        .map_err(|e: dormstore_core::CoreError| {
            ApiError::new(request_id, "validation_error", e.to_string())
        })?;

    let buyer = match identity {
        Identity::User(user) => Buyer::User { user_id: user.id },
        Identity::Guest => {
            let lines = body
                .cart_items
                .into_iter()
                .map(|l| l.into_line().map(OrderLineInput::from))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|message| ApiError::new(request_id, "validation_error", message))?;
            Buyer::Guest { lines }
        }
    };

    Ok(CheckoutRequest {
        buyer,
        shipping: body.shipping_info,
        shipping_method,
        payment_method: body.payment_method,
    })
}

/// POST /api/orders
pub(super) async fn place_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Json(body): Json<PlaceOrderBody>,
) -> Result<(StatusCode, Json<ApiResponse<PlaceOrderResponse>>), ApiError> {
    let rid = req_id.0;
    let request = build_request(&rid, &identity, body)?;

    let placed = dormstore_db::place_order(&state.pool, &request)
        .await
        .map_err(|e| map_checkout_error(&rid, &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(PlaceOrderResponse::from(placed), rid)),
    ))
}

pub(super) async fn list_my_orders(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<Vec<OrderRow>>>, ApiError> {
    let user_id = require_user(&req_id.0, &identity)?;
    let rows = dormstore_db::list_user_orders(&state.pool, user_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(rows, req_id.0)))
}

/// GET /api/orders/{order_number} - another user's order reads as missing.
pub(super) async fn get_my_order(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderDetail>>, ApiError> {
    let rid = req_id.0;
    let user_id = require_user(&rid, &identity)?;

    let detail = load_order_detail(&state.pool, &order_number)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .filter(|d| d.order.user_id == Some(user_id))
        .ok_or_else(|| ApiError::new(&rid, "not_found", format!("order {order_number} not found")))?;

    Ok(Json(ApiResponse::new(detail, rid)))
}
