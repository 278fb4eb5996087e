use axum::{extract::State, Extension, Json};
use dormstore_db::BalanceRow;

use crate::middleware::{Identity, RequestId};

use super::{map_db_error, require_user, ApiError, ApiResponse, AppState};

pub(super) async fn get_my_balance(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ApiResponse<BalanceRow>>, ApiError> {
    let user_id = require_user(&req_id.0, &identity)?;
    let balance = dormstore_db::get_balance(&state.pool, user_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(balance, req_id.0)))
}
