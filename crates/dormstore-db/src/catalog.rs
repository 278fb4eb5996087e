//! Database operations for `products`, `packages`, and `package_items`.
//!
//! Every write that can change a product's availability or a package's
//! composition runs the inventory sync inside the same transaction, so
//! composite package stock is current the moment the write commits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dormstore_core::{option_list, CartItemRef, CatalogEntry};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use crate::{inventory, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Comma-separated size options, or a single value.
    pub size: Option<String>,
    /// Comma-separated color options, or a single value.
    pub color: Option<String>,
    pub image_url: Option<String>,
    pub stock: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A row from the `packages` table plus whether it has composition rows.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PackageRow {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Admin-set for standalone packages, derived for composite ones.
    pub stock: i32,
    pub is_active: bool,
    pub is_composite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A composition row joined with the product it references.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PackageItemRow {
    pub package_id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub product_name: Option<String>,
    pub product_stock: Option<i32>,
    /// `false` when the product is inactive, soft-deleted, or missing.
    pub product_available: bool,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub image_url: Option<String>,
    pub stock: i32,
    pub is_active: bool,
}

/// Sparse product update. `None` keeps the current value; for nullable
/// columns `Some(None)` clears it.
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub size: Option<Option<String>>,
    pub color: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewPackage {
    pub name: String,
    pub price: Decimal,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// Ignored when `items` is non-empty; composite stock is derived.
    pub stock: i32,
    pub is_active: bool,
    /// `(product_id, quantity)` composition rows.
    pub items: Vec<(i64, i32)>,
}

/// Sparse package update; same conventions as [`ProductUpdate`].
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default)]
pub struct PackageUpdate {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub category: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    /// Rejected with [`DbError::DerivedStock`] for composite packages.
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
}

const PRODUCT_COLUMNS: &str = "id, name, price, category, description, size, color, image_url, \
     stock, is_active, created_at, updated_at, deleted_at";

const PACKAGE_COLUMNS: &str = "id, name, price, category, description, image_url, stock, is_active, \
     EXISTS (SELECT 1 FROM package_items pi WHERE pi.package_id = packages.id) AS is_composite, \
     created_at, updated_at, deleted_at";

// ---------------------------------------------------------------------------
// products
// ---------------------------------------------------------------------------

/// Returns non-deleted products ordered by name. Inactive products are
/// included only when `include_inactive` is set.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    category: Option<&str>,
    include_inactive: bool,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE deleted_at IS NULL \
           AND ($1::TEXT IS NULL OR category = $1) \
           AND ($2 OR is_active) \
         ORDER BY name, id"
    ))
    .bind(category)
    .bind(include_inactive)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a non-deleted product by id, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product(pool: &PgPool, id: i64) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Inserts a product and returns the full row.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for a negative stock or price, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn create_product(pool: &PgPool, product: &NewProduct) -> Result<ProductRow, DbError> {
    validate_price_and_stock(Some(product.price), Some(product.stock))?;

    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "INSERT INTO products \
             (name, price, category, description, size, color, image_url, stock, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(&product.name)
    .bind(product.price)
    .bind(&product.category)
    .bind(&product.description)
    .bind(&product.size)
    .bind(&product.color)
    .bind(&product.image_url)
    .bind(product.stock)
    .bind(product.is_active)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Applies a sparse update to a product.
///
/// When stock or the active flag changes, every composite package that
/// contains the product is recomputed in the same transaction.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist or is
/// deleted, [`DbError::Invalid`] for negative values, or [`DbError::Sqlx`].
pub async fn update_product(
    pool: &PgPool,
    id: i64,
    update: &ProductUpdate,
) -> Result<ProductRow, DbError> {
    validate_price_and_stock(update.price, update.stock)?;

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "UPDATE products \
         SET name        = COALESCE($2, name), \
             price       = COALESCE($3, price), \
             category    = CASE WHEN $4::BOOL THEN $5 ELSE category END, \
             description = CASE WHEN $6::BOOL THEN $7 ELSE description END, \
             size        = CASE WHEN $8::BOOL THEN $9 ELSE size END, \
             color       = CASE WHEN $10::BOOL THEN $11 ELSE color END, \
             image_url   = CASE WHEN $12::BOOL THEN $13 ELSE image_url END, \
             stock       = COALESCE($14, stock), \
             is_active   = COALESCE($15, is_active), \
             updated_at  = NOW() \
         WHERE id = $1 AND deleted_at IS NULL \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(id)
    .bind(&update.name)
    .bind(update.price)
    .bind(update.category.is_some())
    .bind(update.category.clone().flatten())
    .bind(update.description.is_some())
    .bind(update.description.clone().flatten())
    .bind(update.size.is_some())
    .bind(update.size.clone().flatten())
    .bind(update.color.is_some())
    .bind(update.color.clone().flatten())
    .bind(update.image_url.is_some())
    .bind(update.image_url.clone().flatten())
    .bind(update.stock)
    .bind(update.is_active)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if update.stock.is_some() || update.is_active.is_some() {
        inventory::sync_packages_for_products(&mut tx, &[id]).await?;
    }

    tx.commit().await?;
    Ok(row)
}

/// Soft-deletes a product. Composite packages containing it drop to zero
/// stock through the inventory sync.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product is missing or already
/// deleted, or [`DbError::Sqlx`].
pub async fn delete_product(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE products \
         SET is_active = false, deleted_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    inventory::sync_packages_for_products(&mut tx, &[id]).await?;
    tx.commit().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// packages
// ---------------------------------------------------------------------------

/// Returns non-deleted packages ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_packages(
    pool: &PgPool,
    category: Option<&str>,
    include_inactive: bool,
) -> Result<Vec<PackageRow>, DbError> {
    let rows = sqlx::query_as::<_, PackageRow>(&format!(
        "SELECT {PACKAGE_COLUMNS} FROM packages \
         WHERE deleted_at IS NULL \
           AND ($1::TEXT IS NULL OR category = $1) \
           AND ($2 OR is_active) \
         ORDER BY name, id"
    ))
    .bind(category)
    .bind(include_inactive)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns a non-deleted package by id, or `None`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_package(pool: &PgPool, id: i64) -> Result<Option<PackageRow>, DbError> {
    let mut conn = pool.acquire().await?;
    fetch_package(&mut conn, id).await
}

pub(crate) async fn fetch_package(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<PackageRow>, DbError> {
    let row = sqlx::query_as::<_, PackageRow>(&format!(
        "SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row)
}

/// Inserts a package with optional composition rows.
///
/// With composition rows the package is composite and its stock is derived
/// before the transaction commits; `stock` is only honored for standalone
/// packages.
///
/// # Errors
///
/// Returns [`DbError::Invalid`] for bad quantities or unknown products, or
/// [`DbError::Sqlx`].
pub async fn create_package(pool: &PgPool, package: &NewPackage) -> Result<PackageRow, DbError> {
    validate_price_and_stock(Some(package.price), Some(package.stock))?;
    validate_items(&package.items)?;

    let mut tx = pool.begin().await?;
    let product_ids: Vec<i64> = package.items.iter().map(|&(product_id, _)| product_id).collect();
    lock_component_products(&mut tx, &product_ids).await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO packages (name, price, category, description, image_url, stock, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id",
    )
    .bind(&package.name)
    .bind(package.price)
    .bind(&package.category)
    .bind(&package.description)
    .bind(&package.image_url)
    .bind(if package.items.is_empty() { package.stock } else { 0 })
    .bind(package.is_active)
    .fetch_one(&mut *tx)
    .await?;

    for &(product_id, quantity) in &package.items {
        ensure_product_exists(&mut tx, product_id).await?;
        insert_item(&mut tx, id, product_id, quantity).await?;
    }
    inventory::sync_packages(&mut tx, &[id]).await?;

    let row = fetch_package(&mut tx, id).await?.ok_or(DbError::NotFound)?;
    tx.commit().await?;
    Ok(row)
}

/// Applies a sparse update to a package.
///
/// # Errors
///
/// Returns [`DbError::DerivedStock`] when `stock` is set on a composite
/// package, [`DbError::NotFound`] if the package is missing or deleted,
/// [`DbError::Invalid`] for negative values, or [`DbError::Sqlx`].
pub async fn update_package(
    pool: &PgPool,
    id: i64,
    update: &PackageUpdate,
) -> Result<PackageRow, DbError> {
    validate_price_and_stock(update.price, update.stock)?;

    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, PackageRow>(&format!(
        "SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = $1 AND deleted_at IS NULL FOR NO KEY UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(DbError::NotFound)?;

    if update.stock.is_some() && current.is_composite {
        return Err(DbError::DerivedStock { package_id: id });
    }

    let row = sqlx::query_as::<_, PackageRow>(&format!(
        "UPDATE packages \
         SET name        = COALESCE($2, name), \
             price       = COALESCE($3, price), \
             category    = CASE WHEN $4::BOOL THEN $5 ELSE category END, \
             description = CASE WHEN $6::BOOL THEN $7 ELSE description END, \
             image_url   = CASE WHEN $8::BOOL THEN $9 ELSE image_url END, \
             stock       = COALESCE($10, stock), \
             is_active   = COALESCE($11, is_active), \
             updated_at  = NOW() \
         WHERE id = $1 \
         RETURNING {PACKAGE_COLUMNS}"
    ))
    .bind(id)
    .bind(&update.name)
    .bind(update.price)
    .bind(update.category.is_some())
    .bind(update.category.clone().flatten())
    .bind(update.description.is_some())
    .bind(update.description.clone().flatten())
    .bind(update.image_url.is_some())
    .bind(update.image_url.clone().flatten())
    .bind(update.stock)
    .bind(update.is_active)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// Soft-deletes a package.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the package is missing or already
/// deleted, or [`DbError::Sqlx`].
pub async fn delete_package(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE packages \
         SET is_active = false, deleted_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// package_items
// ---------------------------------------------------------------------------

/// Returns a package's composition rows joined with product availability.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_package_items(
    pool: &PgPool,
    package_id: i64,
) -> Result<Vec<PackageItemRow>, DbError> {
    let rows = sqlx::query_as::<_, PackageItemRow>(
        "SELECT pi.package_id, pi.product_id, pi.quantity, \
                p.name AS product_name, p.stock AS product_stock, \
                COALESCE(p.is_active AND p.deleted_at IS NULL, false) AS product_available \
         FROM package_items pi \
         LEFT JOIN products p ON p.id = pi.product_id \
         WHERE pi.package_id = $1 \
         ORDER BY pi.product_id",
    )
    .bind(package_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Adds a product to a package, or changes its quantity if already present,
/// then recomputes the package's stock.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the package does not exist,
/// [`DbError::Invalid`] for a bad quantity or unknown product, or
/// [`DbError::Sqlx`].
pub async fn upsert_package_item(
    pool: &PgPool,
    package_id: i64,
    product_id: i64,
    quantity: i32,
) -> Result<Vec<PackageItemRow>, DbError> {
    validate_items(&[(product_id, quantity)])?;

    let mut tx = pool.begin().await?;
    lock_component_products(&mut tx, &[product_id]).await?;
    lock_package(&mut tx, package_id).await?;
    ensure_product_exists(&mut tx, product_id).await?;

    sqlx::query(
        "INSERT INTO package_items (package_id, product_id, quantity) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (package_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity",
    )
    .bind(package_id)
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *tx)
    .await?;

    inventory::sync_packages(&mut tx, &[package_id]).await?;
    tx.commit().await?;

    list_package_items(pool, package_id).await
}

/// Replaces a package's whole composition, then recomputes its stock.
///
/// An empty list turns the package standalone; it keeps its last stock
/// value, which becomes admin-writable.
///
/// # Errors
///
/// Same as [`upsert_package_item`].
pub async fn replace_package_items(
    pool: &PgPool,
    package_id: i64,
    items: &[(i64, i32)],
) -> Result<Vec<PackageItemRow>, DbError> {
    validate_items(items)?;

    let mut tx = pool.begin().await?;
    let product_ids: Vec<i64> = items.iter().map(|&(product_id, _)| product_id).collect();
    lock_component_products(&mut tx, &product_ids).await?;
    lock_package(&mut tx, package_id).await?;

    sqlx::query("DELETE FROM package_items WHERE package_id = $1")
        .bind(package_id)
        .execute(&mut *tx)
        .await?;

    for &(product_id, quantity) in items {
        ensure_product_exists(&mut tx, product_id).await?;
        insert_item(&mut tx, package_id, product_id, quantity).await?;
    }

    inventory::sync_packages(&mut tx, &[package_id]).await?;
    tx.commit().await?;

    list_package_items(pool, package_id).await
}

/// Removes one product from a package's composition. Removing an absent
/// row is a no-op.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the package does not exist, or
/// [`DbError::Sqlx`].
pub async fn delete_package_item(
    pool: &PgPool,
    package_id: i64,
    product_id: i64,
) -> Result<Vec<PackageItemRow>, DbError> {
    let mut tx = pool.begin().await?;
    lock_package(&mut tx, package_id).await?;

    sqlx::query("DELETE FROM package_items WHERE package_id = $1 AND product_id = $2")
        .bind(package_id)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

    inventory::sync_packages(&mut tx, &[package_id]).await?;
    tx.commit().await?;

    list_package_items(pool, package_id).await
}

// ---------------------------------------------------------------------------
// Live catalog lookups
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: i64,
    name: String,
    price: Decimal,
    image_url: Option<String>,
    stock: i32,
    available: bool,
    size: Option<String>,
    color: Option<String>,
}

impl EntryRow {
    fn into_entry(self, item: CartItemRef) -> CatalogEntry {
        CatalogEntry {
            item,
            name: self.name,
            price: self.price,
            image_url: self.image_url,
            stock: self.stock,
            is_active: self.available,
            sizes: option_list(self.size.as_deref()),
            colors: option_list(self.color.as_deref()),
        }
    }
}

/// Loads live catalog data for the given items. Items with no row at all
/// are absent from the map; deleted or inactive rows are present with
/// `is_active == false`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn lookup_entries(
    conn: &mut PgConnection,
    items: &[CartItemRef],
) -> Result<HashMap<CartItemRef, CatalogEntry>, DbError> {
    let product_ids: Vec<i64> = items.iter().filter_map(CartItemRef::product_id).collect();
    let package_ids: Vec<i64> = items.iter().filter_map(CartItemRef::package_id).collect();

    let mut entries = product_entries(conn, &product_ids, false).await?;
    entries.extend(package_entries(conn, &package_ids, false).await?);
    Ok(entries)
}

/// Product entries by id; `for_update` row-locks them in ascending id order.
pub(crate) async fn product_entries(
    conn: &mut PgConnection,
    ids: &[i64],
    for_update: bool,
) -> Result<HashMap<CartItemRef, CatalogEntry>, DbError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let lock = if for_update { " FOR NO KEY UPDATE" } else { "" };
    let rows = sqlx::query_as::<_, EntryRow>(&format!(
        "SELECT id, name, price, image_url, stock, \
                (is_active AND deleted_at IS NULL) AS available, size, color \
         FROM products WHERE id = ANY($1) ORDER BY id{lock}"
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let item = CartItemRef::Product { product_id: row.id };
            (item, row.into_entry(item))
        })
        .collect())
}

/// Package entries by id; `for_update` row-locks them in ascending id order.
pub(crate) async fn package_entries(
    conn: &mut PgConnection,
    ids: &[i64],
    for_update: bool,
) -> Result<HashMap<CartItemRef, CatalogEntry>, DbError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let lock = if for_update { " FOR NO KEY UPDATE" } else { "" };
    let rows = sqlx::query_as::<_, EntryRow>(&format!(
        "SELECT id, name, price, image_url, stock, \
                (is_active AND deleted_at IS NULL) AS available, \
                NULL::TEXT AS size, NULL::TEXT AS color \
         FROM packages WHERE id = ANY($1) ORDER BY id{lock}"
    ))
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let item = CartItemRef::Package { package_id: row.id };
            (item, row.into_entry(item))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_price_and_stock(price: Option<Decimal>, stock: Option<i32>) -> Result<(), DbError> {
    if price.is_some_and(|p| p.is_sign_negative()) {
        return Err(DbError::Invalid("price must not be negative".to_string()));
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(DbError::Invalid("stock must not be negative".to_string()));
    }
    Ok(())
}

fn validate_items(items: &[(i64, i32)]) -> Result<(), DbError> {
    for (i, &(product_id, quantity)) in items.iter().enumerate() {
        if quantity < 1 {
            return Err(DbError::Invalid(format!(
                "quantity for product {product_id} must be at least 1, got {quantity}"
            )));
        }
        if items[..i].iter().any(|&(seen, _)| seen == product_id) {
            return Err(DbError::Invalid(format!(
                "product {product_id} is listed more than once"
            )));
        }
    }
    Ok(())
}

/// Share-locks component products in ascending id order. Callers take this
/// before any package lock.
async fn lock_component_products(
    conn: &mut PgConnection,
    product_ids: &[i64],
) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR SHARE",
    )
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;
    Ok(())
}

async fn lock_package(conn: &mut PgConnection, package_id: i64) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i64>(
        "SELECT id FROM packages WHERE id = $1 AND deleted_at IS NULL FOR NO KEY UPDATE",
    )
    .bind(package_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(DbError::NotFound)?;
    Ok(())
}

async fn ensure_product_exists(conn: &mut PgConnection, product_id: i64) -> Result<(), DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM products WHERE id = $1 AND deleted_at IS NULL)",
    )
    .bind(product_id)
    .fetch_one(&mut *conn)
    .await?;

    if exists {
        Ok(())
    } else {
        Err(DbError::Invalid(format!("product {product_id} does not exist")))
    }
}

async fn insert_item(
    conn: &mut PgConnection,
    package_id: i64,
    product_id: i64,
    quantity: i32,
) -> Result<(), DbError> {
    sqlx::query("INSERT INTO package_items (package_id, product_id, quantity) VALUES ($1, $2, $3)")
        .bind(package_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
