//! Shopper account, token, and balance commands.

use clap::Subcommand;
use rust_decimal::Decimal;

/// Sub-commands available under `user`.
#[derive(Debug, Subcommand)]
pub enum UserCommands {
    /// Create a shopper, or look up the existing one with that email
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Issue a bearer token for a shopper; the token is printed once
    Token {
        #[arg(long)]
        user_id: i64,
        /// Days until the token expires; omit for a non-expiring token
        #[arg(long)]
        ttl_days: Option<i64>,
    },
}

/// Sub-commands available under `balance`.
#[derive(Debug, Subcommand)]
pub enum BalanceCommands {
    /// Print a shopper's balance
    Show {
        #[arg(long)]
        user_id: i64,
    },
    /// Credit a shopper's balance
    TopUp {
        #[arg(long)]
        user_id: i64,
        #[arg(long, value_parser = crate::parse_amount)]
        amount: Decimal,
    },
}

pub(crate) async fn run_user_create(
    pool: &sqlx::PgPool,
    email: &str,
    name: Option<&str>,
) -> anyhow::Result<()> {
    let user = dormstore_db::create_user(pool, email, name).await?;
    println!("user {} <{}>", user.id, user.email);
    Ok(())
}

pub(crate) async fn run_user_token(
    pool: &sqlx::PgPool,
    salt: &str,
    user_id: i64,
    ttl_days: Option<i64>,
) -> anyhow::Result<()> {
    if ttl_days.is_some_and(|d| d < 1) {
        anyhow::bail!("--ttl-days must be at least 1");
    }

    let token = match dormstore_db::issue_token(pool, salt, user_id, ttl_days).await {
        Ok(token) => token,
        Err(dormstore_db::DbError::NotFound) => anyhow::bail!("user {user_id} not found"),
        Err(e) => return Err(e.into()),
    };

    tracing::info!(user_id, "issued bearer token");
    println!("{token}");
    Ok(())
}

pub(crate) async fn run_balance_show(pool: &sqlx::PgPool, user_id: i64) -> anyhow::Result<()> {
    let balance = dormstore_db::get_balance(pool, user_id).await?;
    println!(
        "user {}: balance {} (total spent {})",
        balance.user_id, balance.balance, balance.total_spent
    );
    Ok(())
}

pub(crate) async fn run_balance_top_up(
    pool: &sqlx::PgPool,
    user_id: i64,
    amount: Decimal,
) -> anyhow::Result<()> {
    let balance = match dormstore_db::top_up_balance(pool, user_id, amount).await {
        Ok(balance) => balance,
        Err(dormstore_db::DbError::NotFound) => anyhow::bail!("user {user_id} not found"),
        Err(e) => return Err(e.into()),
    };

    println!("user {}: balance now {}", balance.user_id, balance.balance);
    Ok(())
}
