//! Shared helpers for route tests.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use tower::ServiceExt;

use super::{build_app, rate_limit_state, AppState};
use crate::middleware::AuthState;

pub(crate) const SALT: &str = "test-salt";
pub(crate) const ADMIN_KEY: &str = "test-admin-key";

pub(crate) struct TestResponse {
    pub status: StatusCode,
    pub json: serde_json::Value,
}

pub(crate) fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub(crate) fn authed_get(uri: &str, bearer: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .body(Body::empty())
        .expect("request")
}

pub(crate) async fn send(pool: sqlx::PgPool, request: Request<Body>) -> TestResponse {
    let auth = AuthState::from_keys(&[ADMIN_KEY.to_string()], false).expect("auth");
    let state = AppState {
        pool,
        token_hash_salt: SALT.into(),
    };
    let app = build_app(state, auth, rate_limit_state(1_000, 60));

    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).expect("json parse")
    };

    TestResponse { status, json }
}

/// Creates a user and returns `(user_id, bearer_token)`.
pub(crate) async fn seed_user(pool: &sqlx::PgPool, email: &str) -> (i64, String) {
    let user = dormstore_db::create_user(pool, email, None)
        .await
        .expect("create_user");
    let token = dormstore_db::issue_token(pool, SALT, user.id, None)
        .await
        .expect("issue_token");
    (user.id, token)
}

pub(crate) async fn seed_product(pool: &sqlx::PgPool, name: &str, price_cents: i64, stock: i32) -> i64 {
    dormstore_db::create_product(
        pool,
        &dormstore_db::NewProduct {
            name: name.to_string(),
            price: rust_decimal::Decimal::new(price_cents, 2),
            category: None,
            description: None,
            size: None,
            color: None,
            image_url: None,
            stock,
            is_active: true,
        },
    )
    .await
    .expect("create_product")
    .id
}
