use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

// Path relative to crates/dormstore-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &dormstore_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("package {package_id} is composite; its stock is derived from its components")]
    DerivedStock { package_id: i64 },
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    /// `true` for a Postgres unique-constraint violation (SQLSTATE 23505).
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            DbError::Sqlx(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23505")
        )
    }

    /// `true` for a foreign-key violation (SQLSTATE 23503).
    #[must_use]
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            DbError::Sqlx(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("23503")
        )
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table may not exist yet on a fresh database; treat
    // absence as zero applied.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

pub mod balances;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod inventory;
pub mod orders;
pub mod users;

pub use balances::{get_balance, top_up_balance, BalanceRow};
pub use cart::{
    add_item, clear_cart, get_cart, remove_item, update_quantity, CartError, CartStore, CartView,
    GuestCart, RemovedItem, ResolvedLine, ServerCart,
};
pub use catalog::{
    create_package, create_product, delete_package, delete_package_item, delete_product,
    get_package, get_product, list_package_items, list_packages, list_products, lookup_entries,
    replace_package_items, update_package, update_product, upsert_package_item, NewPackage,
    NewProduct, PackageItemRow, PackageRow, PackageUpdate, ProductRow, ProductUpdate,
};
pub use checkout::{place_order, Buyer, CheckoutError, CheckoutRequest, OrderLineInput, PlacedOrder};
pub use inventory::{
    check_package_stock, package_details, sync_all_packages, sync_packages_for_products,
    ComponentDetail, PackageDetails, PackageStockChange, PackageStockDrift,
};
pub use orders::{
    get_order_by_number, list_order_items, list_order_packages, list_orders, list_user_orders,
    set_payment_status, update_order_status, OrderFilters, OrderItemRow, OrderPackageRow,
    OrderRow, TransitionError,
};
pub use users::{create_user, hash_token, issue_token, resolve_token, UserRow};

