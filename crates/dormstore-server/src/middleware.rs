use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dormstore_db::UserRow;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{ApiError, AppState};

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Who is calling a storefront route, stored as a request extension.
#[derive(Debug, Clone)]
pub enum Identity {
    Guest,
    User(UserRow),
}

impl Identity {
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        match self {
            Identity::Guest => None,
            Identity::User(user) => Some(user.id),
        }
    }
}

/// Admin key auth settings used by middleware.
#[derive(Debug, Clone)]
pub struct AuthState {
    admin_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds admin auth from `DORMSTORE_ADMIN_KEYS` as parsed into config.
    ///
    /// In development, no keys disables admin auth for local iteration.
    /// In other environments, no keys fails startup.
    pub fn from_keys(keys: &[String], is_development: bool) -> anyhow::Result<Self> {
        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "DORMSTORE_ADMIN_KEYS not set; admin auth disabled in development environment"
                );
                return Ok(Self {
                    admin_keys: Arc::new(Vec::new()),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "DORMSTORE_ADMIN_KEYS is required outside development; provide comma-separated bearer keys"
            );
        }

        Ok(Self {
            admin_keys: Arc::new(keys.to_vec()),
            enabled: true,
        })
    }

    fn allows(&self, token: &str) -> bool {
        self.admin_keys
            .iter()
            .any(|key| bool::from(key.as_bytes().ct_eq(token.as_bytes())))
    }
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter shared by every rate-limited route.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware resolving an optional user bearer token into an [`Identity`].
///
/// No token means a guest. A token that does not resolve is rejected rather
/// than silently downgraded to a guest.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let rid = request_id_of(&req);
    let token = extract_bearer_token(req.headers().get(AUTHORIZATION)).map(str::to_owned);
    let identity = match token {
        None => Identity::Guest,
        Some(token) => {
            match dormstore_db::resolve_token(&state.pool, &state.token_hash_salt, &token).await {
                Ok(Some(user)) => Identity::User(user),
                Ok(None) => {
                    return ApiError::new(rid, "unauthorized", "invalid or expired bearer token")
                        .into_response();
                }
                Err(e) => {
                    tracing::error!(error = %e, "token lookup failed");
                    return ApiError::new(rid, "internal_error", "database query failed")
                        .into_response();
                }
            }
        }
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// Middleware enforcing admin bearer auth when enabled.
pub async fn require_admin_auth(
    State(auth): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    let token = extract_bearer_token(req.headers().get(AUTHORIZATION));

    match token {
        Some(token) if auth.allows(token) => next.run(req).await,
        _ => ApiError::new(
            request_id_of(&req),
            "unauthorized",
            "missing or invalid admin bearer token",
        )
        .into_response(),
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        drop(window);
        return ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
