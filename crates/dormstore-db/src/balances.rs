//! Database operations for `user_balance`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use crate::DbError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BalanceRow {
    pub user_id: i64,
    pub balance: Decimal,
    pub total_spent: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Returns a user's balance. A user with no row reads as zero.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_balance(pool: &PgPool, user_id: i64) -> Result<BalanceRow, DbError> {
    let row = sqlx::query_as::<_, BalanceRow>(
        "SELECT user_id, balance, total_spent, updated_at FROM user_balance WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.unwrap_or(BalanceRow {
        user_id,
        balance: Decimal::ZERO,
        total_spent: Decimal::ZERO,
        updated_at: Utc::now(),
    }))
}

/// Ensures the balance row exists, then locks it for the caller's
/// transaction.
pub(crate) async fn lock_balance(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<BalanceRow, DbError> {
    sqlx::query("INSERT INTO user_balance (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query_as::<_, BalanceRow>(
        "SELECT user_id, balance, total_spent, updated_at \
         FROM user_balance WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

/// Subtracts `amount` from the balance and adds it to `total_spent`.
/// The row must already be locked by [`lock_balance`].
pub(crate) async fn debit_balance(
    conn: &mut PgConnection,
    user_id: i64,
    amount: Decimal,
) -> Result<BalanceRow, DbError> {
    let row = sqlx::query_as::<_, BalanceRow>(
        "UPDATE user_balance \
         SET balance = balance - $2, total_spent = total_spent + $2, updated_at = NOW() \
         WHERE user_id = $1 \
         RETURNING user_id, balance, total_spent, updated_at",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

/// Adds funds to a user's balance, creating the row if needed.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for a non-positive amount,
/// [`DbError::NotFound`] if the user does not exist, or [`DbError::Sqlx`].
pub async fn top_up_balance(
    pool: &PgPool,
    user_id: i64,
    amount: Decimal,
) -> Result<BalanceRow, DbError> {
    if amount <= Decimal::ZERO {
        return Err(DbError::Invalid(format!(
            "top-up amount must be positive, got {amount}"
        )));
    }

    let result = sqlx::query_as::<_, BalanceRow>(
        "INSERT INTO user_balance (user_id, balance) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE \
             SET balance = user_balance.balance + EXCLUDED.balance, updated_at = NOW() \
         RETURNING user_id, balance, total_spent, updated_at",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(pool)
    .await
    .map_err(DbError::from);

    match result {
        Err(err) if err.is_foreign_key_violation() => Err(DbError::NotFound),
        other => other,
    }
}
