//! Cart aggregator, generic over where the lines live.
//!
//! [`ServerCart`] keeps lines in `cart_items` for signed-in users;
//! [`GuestCart`] wraps the array a guest client sends with each request.
//! Both are validated against live catalog data on every operation.

mod guest;
pub(crate) mod server;

use std::collections::HashMap;

use dormstore_core::{
    ensure_positive, quantities_by_item, CartItemRef, CartLine, CatalogEntry, Selection,
};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use crate::{catalog, DbError};

pub use guest::GuestCart;
pub use server::ServerCart;

/// Storage port for cart lines.
#[allow(async_fn_in_trait)]
pub trait CartStore {
    /// All lines in insertion order.
    async fn lines(&mut self) -> Result<Vec<CartLine>, DbError>;

    /// Adds `quantity` to the line with the same item and selection, or
    /// inserts a new line. Returns the resulting line.
    async fn merge(
        &mut self,
        item: CartItemRef,
        selection: &Selection,
        quantity: i32,
    ) -> Result<CartLine, DbError>;

    /// Overwrites a line's quantity. `None` when the line does not exist.
    async fn set_quantity(
        &mut self,
        line_id: &str,
        quantity: i32,
    ) -> Result<Option<CartLine>, DbError>;

    /// Removes lines by id; unknown ids are ignored.
    async fn remove(&mut self, line_ids: &[String]) -> Result<(), DbError>;

    async fn clear(&mut self) -> Result<(), DbError>;
}

#[derive(Debug, Error)]
pub enum CartError {
    #[error("only {available} of {name} in stock, requested {requested}")]
    OutOfStock {
        item: CartItemRef,
        name: String,
        requested: i32,
        available: i32,
    },
    #[error("{item} is not available")]
    ItemNotFound { item: CartItemRef },
    #[error("cart line {line_id} not found")]
    LineNotFound { line_id: String },
    #[error("{0}")]
    InvalidSelection(String),
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),
    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<sqlx::Error> for CartError {
    fn from(err: sqlx::Error) -> Self {
        CartError::Db(DbError::Sqlx(err))
    }
}

/// A cart line joined with live catalog data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLine {
    #[serde(flatten)]
    pub line: CartLine,
    pub name: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub available_stock: i32,
    /// `false` when the item's total quantity across lines exceeds stock.
    pub in_stock: bool,
    pub line_total: Decimal,
}

/// A line dropped on read because its catalog entry is gone.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedItem {
    pub line_id: String,
    pub item: CartItemRef,
    /// Last known name, when the entry still has a row.
    pub name: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub lines: Vec<ResolvedLine>,
    pub removed_items: Vec<RemovedItem>,
    pub subtotal: Decimal,
    pub item_count: i32,
}

/// Reads the cart, dropping lines whose item is missing or inactive.
///
/// Dropped lines are deleted from the store and reported in
/// [`CartView::removed_items`].
///
/// # Errors
///
/// Returns [`CartError::Db`] on storage failure.
pub async fn get_cart<S: CartStore>(pool: &PgPool, store: &mut S) -> Result<CartView, CartError> {
    let lines = store.lines().await?;
    let entries = load_entries(pool, lines.iter().map(|l| l.item)).await?;

    let mut kept = Vec::with_capacity(lines.len());
    let mut removed_items = Vec::new();
    for line in lines {
        match entries.get(&line.item) {
            Some(entry) if entry.is_active => kept.push((line, entry)),
            Some(entry) => removed_items.push(RemovedItem {
                line_id: line.id,
                item: line.item,
                name: Some(entry.name.clone()),
                reason: "no longer available".to_string(),
            }),
            None => removed_items.push(RemovedItem {
                line_id: line.id,
                item: line.item,
                name: None,
                reason: "no longer exists".to_string(),
            }),
        }
    }

    if !removed_items.is_empty() {
        let ids: Vec<String> = removed_items.iter().map(|r| r.line_id.clone()).collect();
        store.remove(&ids).await?;
        tracing::info!(count = ids.len(), "dropped unavailable cart lines");
    }

    let totals: HashMap<CartItemRef, i32> =
        quantities_by_item(kept.iter().map(|(l, _)| (&l.item, l.quantity)))
            .into_iter()
            .collect();

    let lines: Vec<ResolvedLine> = kept
        .into_iter()
        .map(|(line, entry)| {
            let wanted = totals.get(&line.item).copied().unwrap_or(line.quantity);
            ResolvedLine {
                name: entry.name.clone(),
                price: entry.price,
                image_url: entry.image_url.clone(),
                available_stock: entry.stock,
                in_stock: wanted <= entry.stock,
                line_total: entry.price * Decimal::from(line.quantity),
                line,
            }
        })
        .collect();

    Ok(CartView {
        subtotal: lines.iter().map(|l| l.line_total).sum(),
        item_count: lines.iter().map(|l| l.line.quantity).sum(),
        lines,
        removed_items,
    })
}

/// Adds an item to the cart, merging with an identical line.
///
/// The stock check covers everything the cart would hold for the item
/// afterwards, across all selections.
///
/// # Errors
///
/// Returns [`CartError::InvalidQuantity`], [`CartError::ItemNotFound`],
/// [`CartError::InvalidSelection`], [`CartError::OutOfStock`], or
/// [`CartError::Db`].
pub async fn add_item<S: CartStore>(
    pool: &PgPool,
    store: &mut S,
    item: CartItemRef,
    selection: Selection,
    quantity: i32,
) -> Result<CartLine, CartError> {
    ensure_positive(quantity).map_err(|_| CartError::InvalidQuantity(quantity))?;

    let entry = load_entry(pool, item).await?;
    entry
        .check_selection(&selection)
        .map_err(CartError::InvalidSelection)?;

    let existing: i32 = store
        .lines()
        .await?
        .iter()
        .filter(|l| l.item == item)
        .map(|l| l.quantity)
        .sum();
    ensure_stock(&entry, existing.saturating_add(quantity))?;

    let line = store.merge(item, &selection, quantity).await?;
    Ok(line)
}

/// Sets a line's quantity; zero removes the line.
///
/// Quantity 0 removes the line and returns `None`, like [`remove_item`],
/// even when the line is already gone.
///
/// # Errors
///
/// Returns [`CartError::LineNotFound`] for an unknown line with a non-zero
/// quantity,
/// [`CartError::InvalidQuantity`] for a negative quantity,
/// [`CartError::OutOfStock`] if the new quantity exceeds stock, or
/// [`CartError::Db`].
pub async fn update_quantity<S: CartStore>(
    pool: &PgPool,
    store: &mut S,
    line_id: &str,
    quantity: i32,
) -> Result<Option<CartLine>, CartError> {
    if quantity < 0 {
        return Err(CartError::InvalidQuantity(quantity));
    }

    if quantity == 0 {
        store.remove(&[line_id.to_string()]).await?;
        return Ok(None);
    }

    let lines = store.lines().await?;
    let line = lines
        .iter()
        .find(|l| l.id == line_id)
        .ok_or_else(|| CartError::LineNotFound {
            line_id: line_id.to_string(),
        })?;

    let entry = load_entry(pool, line.item).await?;
    let others: i32 = lines
        .iter()
        .filter(|l| l.item == line.item && l.id != line.id)
        .map(|l| l.quantity)
        .sum();
    ensure_stock(&entry, others.saturating_add(quantity))?;

    store
        .set_quantity(line_id, quantity)
        .await?
        .map(Some)
        .ok_or_else(|| CartError::LineNotFound {
            line_id: line_id.to_string(),
        })
}

/// Removes a line. Removing an absent line is not an error.
///
/// # Errors
///
/// Returns [`CartError::Db`] on storage failure.
pub async fn remove_item<S: CartStore>(store: &mut S, line_id: &str) -> Result<(), CartError> {
    store.remove(&[line_id.to_string()]).await?;
    Ok(())
}

/// # Errors
///
/// Returns [`CartError::Db`] on storage failure.
pub async fn clear_cart<S: CartStore>(store: &mut S) -> Result<(), CartError> {
    store.clear().await?;
    Ok(())
}

fn ensure_stock(entry: &CatalogEntry, requested: i32) -> Result<(), CartError> {
    if requested > entry.stock {
        return Err(CartError::OutOfStock {
            item: entry.item,
            name: entry.name.clone(),
            requested,
            available: entry.stock.max(0),
        });
    }
    Ok(())
}

async fn load_entries<I>(
    pool: &PgPool,
    items: I,
) -> Result<HashMap<CartItemRef, CatalogEntry>, DbError>
where
    I: IntoIterator<Item = CartItemRef>,
{
    let mut items: Vec<CartItemRef> = items.into_iter().collect();
    if items.is_empty() {
        return Ok(HashMap::new());
    }
    items.sort_unstable();
    items.dedup();

    let mut conn = pool.acquire().await?;
    catalog::lookup_entries(&mut conn, &items).await
}

async fn load_entry(pool: &PgPool, item: CartItemRef) -> Result<CatalogEntry, CartError> {
    load_entries(pool, [item])
        .await?
        .remove(&item)
        .filter(|e| e.is_active)
        .ok_or(CartError::ItemNotFound { item })
}
