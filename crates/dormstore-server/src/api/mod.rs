mod admin;
mod balance;
mod cart;
mod orders;
mod packages;
mod products;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_admin_auth, resolve_identity, AuthState,
    RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub token_hash_salt: Arc<str>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "out_of_stock" | "insufficient_stock" | "conflict" | "invalid_transition" => {
                StatusCode::CONFLICT
            }
            "insufficient_funds" => StatusCode::PAYMENT_REQUIRED,
            "order_persistence_failed" => StatusCode::SERVICE_UNAVAILABLE,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &dormstore_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

/// Maps errors from catalog writes, where the caller's input can be at fault.
pub(super) fn map_write_error(request_id: String, error: &dormstore_db::DbError) -> ApiError {
    use dormstore_db::DbError;

    match error {
        DbError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        DbError::Invalid(message) => ApiError::new(request_id, "validation_error", message),
        DbError::DerivedStock { .. } => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        e if e.is_unique_violation() => {
            ApiError::new(request_id, "conflict", "a record with that key already exists")
        }
        e => map_db_error(request_id, e),
    }
}

pub(super) fn require_user(
    request_id: &str,
    identity: &crate::middleware::Identity,
) -> Result<i64, ApiError> {
    identity
        .user_id()
        .ok_or_else(|| ApiError::new(request_id, "unauthorized", "sign in to use this endpoint"))
}

/// Deserializes a present field (including `null`) as `Some`, so that with
/// `#[serde(default)]` a missing field stays `None` and `null` becomes
/// `Some(None)`.
#[allow(clippy::option_option)]
pub(super) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn storefront_router(state: AppState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/products", get(products::list_products))
        .route("/api/products/{id}", get(products::get_product))
        .route("/api/packages", get(packages::list_packages))
        .route("/api/packages/{id}", get(packages::get_package))
        .route("/api/packages/{id}/details", get(packages::get_package_details))
        .route(
            "/cart",
            get(cart::get_cart)
                .post(cart::add_to_cart)
                .delete(cart::clear_cart),
        )
        .route("/cart/resolve", post(cart::resolve_cart))
        .route(
            "/cart/{line_id}",
            put(cart::update_cart_line).delete(cart::remove_cart_line),
        )
        .route(
            "/api/orders",
            get(orders::list_my_orders).post(orders::place_order),
        )
        .route("/api/orders/{order_number}", get(orders::get_my_order))
        .route("/api/balance", get(balance::get_my_balance))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(state, resolve_identity)),
        )
}

fn admin_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/admin/products",
            get(admin::products::list_products).post(admin::products::create_product),
        )
        .route(
            "/api/admin/products/{id}",
            put(admin::products::update_product)
                .delete(admin::products::delete_product),
        )
        .route(
            "/api/admin/packages",
            get(admin::packages::list_packages).post(admin::packages::create_package),
        )
        .route(
            "/api/admin/packages/{id}",
            put(admin::packages::update_package)
                .delete(admin::packages::delete_package),
        )
        .route(
            "/api/admin/packages/{id}/items",
            get(admin::packages::list_items)
                .post(admin::packages::upsert_item)
                .put(admin::packages::replace_items),
        )
        .route(
            "/api/admin/packages/{id}/items/{product_id}",
            delete(admin::packages::delete_item),
        )
        .route("/api/admin/orders", get(admin::orders::list_orders))
        .route(
            "/api/admin/orders/{order_number}",
            get(admin::orders::get_order),
        )
        .route(
            "/api/admin/orders/{order_number}/status",
            patch(admin::orders::update_status),
        )
        .route(
            "/api/admin/orders/{order_number}/payment",
            patch(admin::orders::update_payment),
        )
        .route(
            "/api/admin/users/{user_id}/balance",
            post(admin::users::top_up_balance),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_admin_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(storefront_router(state.clone(), rate_limit.clone()))
        .merge(admin_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match dormstore_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn rate_limit_state(max_requests: usize, window_secs: u64) -> RateLimitState {
    RateLimitState::new(max_requests, Duration::from_secs(window_secs))
}

#[cfg(test)]
pub(crate) mod test_support;
