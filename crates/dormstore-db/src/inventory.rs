//! Derived stock for composite packages.
//!
//! Every write that can change a constituent product's stock or
//! availability, or a package's composition, calls [`sync_packages`] (or
//! [`sync_packages_for_products`]) on the same connection before the
//! transaction commits. Package rows are locked in ascending id order.

use dormstore_core::{binding_component, resolve_package_stock, ComponentStock};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use crate::catalog::{fetch_package, PackageRow};
use crate::DbError;

/// A package whose stored stock was rewritten by a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackageStockChange {
    pub package_id: i64,
    pub previous: i32,
    pub current: i32,
}

/// A composite package whose stored stock disagrees with its components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PackageStockDrift {
    pub package_id: i64,
    pub name: String,
    pub stored: i32,
    pub derived: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentDetail {
    pub product_id: i64,
    pub product_name: Option<String>,
    pub quantity: i32,
    pub product_stock: Option<i32>,
    pub supports: i32,
}

/// A package together with its resolved composition.
#[derive(Debug, Clone)]
pub struct PackageDetails {
    pub package: PackageRow,
    pub components: Vec<ComponentDetail>,
    pub resolved_stock: i32,
    /// The scarcest component, `None` for standalone packages.
    pub binding_product_id: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct ComponentRow {
    package_id: i64,
    product_id: i64,
    quantity: i32,
    product_name: Option<String>,
    /// NULL when the product is missing, inactive, or soft-deleted.
    product_stock: Option<i32>,
}

impl ComponentRow {
    fn stock(&self) -> ComponentStock {
        ComponentStock {
            product_id: self.product_id,
            quantity: self.quantity,
            product_stock: self.product_stock,
        }
    }
}

const COMPONENT_QUERY: &str = "SELECT pi.package_id, pi.product_id, pi.quantity, \
            p.name AS product_name, \
            CASE WHEN p.is_active AND p.deleted_at IS NULL THEN p.stock END AS product_stock \
     FROM package_items pi \
     LEFT JOIN products p ON p.id = pi.product_id \
     WHERE pi.package_id = ANY($1) \
     ORDER BY pi.package_id, pi.product_id";

/// Recomputes stock for the given packages and writes back any that changed.
///
/// Locks the package rows first (ascending id), so concurrent syncs for the
/// same package serialize. Standalone packages keep their stored value.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn sync_packages(
    conn: &mut PgConnection,
    package_ids: &[i64],
) -> Result<Vec<PackageStockChange>, DbError> {
    if package_ids.is_empty() {
        return Ok(Vec::new());
    }

    let locked: Vec<(i64, i32)> = sqlx::query_as(
        "SELECT id, stock FROM packages WHERE id = ANY($1) ORDER BY id FOR NO KEY UPDATE",
    )
    .bind(package_ids)
    .fetch_all(&mut *conn)
    .await?;

    let components = sqlx::query_as::<_, ComponentRow>(COMPONENT_QUERY)
        .bind(package_ids)
        .fetch_all(&mut *conn)
        .await?;

    let mut changes = Vec::new();
    for (package_id, stored) in locked {
        let stocks: Vec<ComponentStock> = components
            .iter()
            .filter(|c| c.package_id == package_id)
            .map(ComponentRow::stock)
            .collect();
        let current = resolve_package_stock(stored, &stocks);
        if current == stored {
            continue;
        }

        sqlx::query("UPDATE packages SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(package_id)
            .bind(current)
            .execute(&mut *conn)
            .await?;

        tracing::debug!(package_id, previous = stored, current, "package stock resynced");
        changes.push(PackageStockChange {
            package_id,
            previous: stored,
            current,
        });
    }

    Ok(changes)
}

/// Ids of packages that contain any of the given products, ascending.
pub(crate) async fn packages_containing(
    conn: &mut PgConnection,
    product_ids: &[i64],
) -> Result<Vec<i64>, DbError> {
    if product_ids.is_empty() {
        return Ok(Vec::new());
    }

    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT package_id FROM package_items \
         WHERE product_id = ANY($1) ORDER BY package_id",
    )
    .bind(product_ids)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}

/// Recomputes every package that contains one of the given products.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn sync_packages_for_products(
    conn: &mut PgConnection,
    product_ids: &[i64],
) -> Result<Vec<PackageStockChange>, DbError> {
    let package_ids = packages_containing(conn, product_ids).await?;
    sync_packages(conn, &package_ids).await
}

/// Recomputes all composite packages in one transaction. Used by the CLI
/// to repair drift after manual edits.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if a query fails.
pub async fn sync_all_packages(pool: &PgPool) -> Result<Vec<PackageStockChange>, DbError> {
    let mut tx = pool.begin().await?;

    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT package_id FROM package_items ORDER BY package_id",
    )
    .fetch_all(&mut *tx)
    .await?;

    let changes = sync_packages(&mut tx, &ids).await?;
    tx.commit().await?;
    Ok(changes)
}

/// Lists composite packages whose stored stock differs from the value
/// derived from their components. Read-only.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn check_package_stock(pool: &PgPool) -> Result<Vec<PackageStockDrift>, DbError> {
    let rows = sqlx::query_as::<_, PackageStockDrift>(
        "SELECT pk.id AS package_id, pk.name, pk.stock AS stored, d.derived \
         FROM packages pk \
         JOIN ( \
             SELECT pi.package_id, \
                    MIN(CASE WHEN p.is_active AND p.deleted_at IS NULL \
                             THEN p.stock / pi.quantity ELSE 0 END)::INT AS derived \
             FROM package_items pi \
             LEFT JOIN products p ON p.id = pi.product_id \
             GROUP BY pi.package_id \
         ) d ON d.package_id = pk.id \
         WHERE pk.stock <> d.derived \
         ORDER BY pk.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Loads a package with its components and the stock they resolve to.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the package does not exist or is
/// deleted, or [`DbError::Sqlx`].
pub async fn package_details(pool: &PgPool, package_id: i64) -> Result<PackageDetails, DbError> {
    let mut conn = pool.acquire().await?;
    let package = fetch_package(&mut conn, package_id)
        .await?
        .ok_or(DbError::NotFound)?;

    let rows = sqlx::query_as::<_, ComponentRow>(COMPONENT_QUERY)
        .bind([package_id].as_slice())
        .fetch_all(&mut *conn)
        .await?;

    let stocks: Vec<ComponentStock> = rows.iter().map(ComponentRow::stock).collect();
    let resolved_stock = resolve_package_stock(package.stock, &stocks);
    let binding_product_id = binding_component(&stocks).map(|c| c.product_id);

    let components = rows
        .into_iter()
        .map(|row| {
            let supports = row.stock().supports();
            ComponentDetail {
                product_id: row.product_id,
                product_name: row.product_name,
                quantity: row.quantity,
                product_stock: row.product_stock,
                supports,
            }
        })
        .collect();

    Ok(PackageDetails {
        package,
        components,
        resolved_stock,
        binding_product_id,
    })
}
