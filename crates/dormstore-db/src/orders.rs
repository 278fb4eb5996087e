//! Database operations for `orders`, `order_items`, and `order_packages`.
//!
//! Orders are inserted only by the checkout transaction; this module reads
//! them and applies admin status changes.

use chrono::{DateTime, Utc};
use dormstore_core::{OrderStatus, PaymentStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::DbError;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderRow {
    pub id: i64,
    pub order_number: String,
    pub user_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub shipping_method: String,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub payment_status: String,
    pub order_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRow {
    pub id: i64,
    pub order_id: i64,
    pub product_id: Option<i64>,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub size: Option<String>,
    pub color: Option<String>,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderPackageRow {
    pub id: i64,
    pub order_id: i64,
    pub package_id: Option<i64>,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilters {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub user_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("order not found")]
    NotFound,
    #[error("cannot move order from {from} to {to}")]
    Invalid { from: OrderStatus, to: OrderStatus },
    #[error("order status changed concurrently; reload and retry")]
    Concurrent,
    #[error("stored order status is not recognized: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for TransitionError {
    fn from(err: sqlx::Error) -> Self {
        TransitionError::Db(DbError::Sqlx(err))
    }
}

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, user_id, first_name, last_name, email, \
     phone, address, city, province, postal_code, shipping_method, payment_method, \
     subtotal, tax, shipping, total, payment_status, order_status, created_at, updated_at";

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

/// Lists orders newest first with optional filters.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_orders(pool: &PgPool, filters: &OrderFilters) -> Result<Vec<OrderRow>, DbError> {
    let limit = filters.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let rows = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE ($1::TEXT IS NULL OR order_status = $1) \
           AND ($2::TEXT IS NULL OR payment_status = $2) \
           AND ($3::BIGINT IS NULL OR user_id = $3) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $4"
    ))
    .bind(filters.status.map(OrderStatus::as_str))
    .bind(filters.payment_status.map(PaymentStatus::as_str))
    .bind(filters.user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Lists one user's orders, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_user_orders(pool: &PgPool, user_id: i64) -> Result<Vec<OrderRow>, DbError> {
    list_orders(
        pool,
        &OrderFilters {
            user_id: Some(user_id),
            ..OrderFilters::default()
        },
    )
    .await
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_order_by_number(
    pool: &PgPool,
    order_number: &str,
) -> Result<Option<OrderRow>, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1"
    ))
    .bind(order_number)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_order_items(pool: &PgPool, order_id: i64) -> Result<Vec<OrderItemRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderItemRow>(
        "SELECT id, order_id, product_id, name, price, quantity, size, color, subtotal \
         FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_order_packages(
    pool: &PgPool,
    order_id: i64,
) -> Result<Vec<OrderPackageRow>, DbError> {
    let rows = sqlx::query_as::<_, OrderPackageRow>(
        "SELECT id, order_id, package_id, name, price, quantity, subtotal \
         FROM order_packages WHERE order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Moves an order forward to `target`.
///
/// The write is a compare-and-set on the status read just before it, so of
/// two concurrent admin edits at most one applies; the other gets
/// [`TransitionError::Concurrent`].
///
/// # Errors
///
/// Returns [`TransitionError::NotFound`], [`TransitionError::Invalid`] for
/// same-state or backward moves, [`TransitionError::Concurrent`], or
/// [`TransitionError::Db`].
pub async fn update_order_status(
    pool: &PgPool,
    order_number: &str,
    target: OrderStatus,
) -> Result<OrderRow, TransitionError> {
    let current: String =
        sqlx::query_scalar("SELECT order_status FROM orders WHERE order_number = $1")
            .bind(order_number)
            .fetch_optional(pool)
            .await?
            .ok_or(TransitionError::NotFound)?;

    let from: OrderStatus = current
        .parse()
        .map_err(|_| TransitionError::Corrupt(current.clone()))?;
    if !from.can_transition_to(target) {
        return Err(TransitionError::Invalid { from, to: target });
    }

    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "UPDATE orders SET order_status = $3, updated_at = NOW() \
         WHERE order_number = $1 AND order_status = $2 \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order_number)
    .bind(from.as_str())
    .bind(target.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or(TransitionError::Concurrent)?;

    tracing::info!(order_number, %from, to = %target, "order status updated");
    Ok(row)
}

/// Sets `payment_status`. Idempotent.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the order does not exist, or
/// [`DbError::Sqlx`].
pub async fn set_payment_status(
    pool: &PgPool,
    order_number: &str,
    status: PaymentStatus,
) -> Result<OrderRow, DbError> {
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "UPDATE orders SET payment_status = $2, updated_at = NOW() \
         WHERE order_number = $1 \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(order_number)
    .bind(status.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    tracing::info!(order_number, payment_status = %status, "order payment status updated");
    Ok(row)
}
