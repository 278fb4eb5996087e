use axum::{
    extract::{Path, State},
    Extension, Json,
};
use dormstore_db::{BalanceRow, DbError};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct TopUpRequest {
    pub amount: Decimal,
}

/// POST /api/admin/users/{user_id}/balance - credits a user's balance.
pub(in crate::api) async fn top_up_balance(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(user_id): Path<i64>,
    Json(body): Json<TopUpRequest>,
) -> Result<Json<ApiResponse<BalanceRow>>, ApiError> {
    let rid = &req_id.0;
    let row = match dormstore_db::top_up_balance(&state.pool, user_id, body.amount).await {
        Ok(row) => row,
        Err(DbError::NotFound) => {
            return Err(ApiError::new(
                rid,
                "not_found",
                format!("user {user_id} not found"),
            ));
        }
        Err(DbError::Invalid(message)) => {
            return Err(ApiError::new(rid, "validation_error", message));
        }
        Err(e) => return Err(map_db_error(rid.clone(), &e)),
    };

    tracing::info!(user_id, amount = %body.amount, "balance topped up");
    Ok(Json(ApiResponse::new(row, req_id.0)))
}
