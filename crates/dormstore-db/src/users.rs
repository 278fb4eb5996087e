//! Users and their bearer tokens.
//!
//! Tokens are random strings handed out once by [`issue_token`]; only a
//! salted SHA-256 digest is stored.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Hex SHA-256 of `salt:token`.
#[must_use]
pub fn hash_token(salt: &str, token: &str) -> String {
    format!("{:x}", Sha256::digest(format!("{salt}:{token}").as_bytes()))
}

/// Creates a user, or returns the existing one with the same email.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for a blank email, or [`DbError::Sqlx`].
pub async fn create_user(pool: &PgPool, email: &str, name: Option<&str>) -> Result<UserRow, DbError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(DbError::Invalid("email must not be empty".to_string()));
    }

    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (email, name) VALUES ($1, $2) \
         ON CONFLICT (email) DO UPDATE SET name = COALESCE(EXCLUDED.name, users.name) \
         RETURNING id, email, name, created_at",
    )
    .bind(email)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Issues a new bearer token for a user and returns it in clear.
///
/// `ttl_days` of `None` issues a token that never expires.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the user does not exist, or
/// [`DbError::Sqlx`].
pub async fn issue_token(
    pool: &PgPool,
    salt: &str,
    user_id: i64,
    ttl_days: Option<i64>,
) -> Result<String, DbError> {
    let token = format!("ds_{}", Uuid::new_v4().simple());
    let expires_at = ttl_days.map(|days| Utc::now() + Duration::days(days));

    let result = sqlx::query(
        "INSERT INTO user_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(user_id)
    .bind(hash_token(salt, &token))
    .bind(expires_at)
    .execute(pool)
    .await
    .map_err(DbError::from);

    match result {
        Ok(_) => Ok(token),
        Err(err) if err.is_foreign_key_violation() => Err(DbError::NotFound),
        Err(err) => Err(err),
    }
}

/// Resolves a bearer token to its user, ignoring expired tokens.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn resolve_token(
    pool: &PgPool,
    salt: &str,
    token: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT u.id, u.email, u.name, u.created_at \
         FROM user_tokens t \
         JOIN users u ON u.id = t.user_id \
         WHERE t.token_hash = $1 AND (t.expires_at IS NULL OR t.expires_at > NOW())",
    )
    .bind(hash_token(salt, token))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_token_is_salted_hex() {
        let a = hash_token("salt-a", "token");
        let b = hash_token("salt-b", "token");
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_eq!(a, hash_token("salt-a", "token"));
    }
}
