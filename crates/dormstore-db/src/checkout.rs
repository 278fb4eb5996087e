//! The checkout transaction.
//!
//! [`place_order`] re-reads stock and prices under row locks, debits the
//! buyer's balance, writes the order, decrements inventory, resyncs
//! dependent packages, and clears the server cart, all in one transaction.
//! Any failure rolls back every write.
//!
//! Lock order: product rows ascending, then package rows ascending, then
//! the balance row. The inventory sync only re-locks packages already held.
//! Stock rows are taken `FOR NO KEY UPDATE`, which leaves the foreign-key
//! share locks of concurrent composition edits unblocked; those edits lock
//! their component products before the package, in the same order.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use dormstore_core::{
    compute_totals, ensure_positive, find_shortfalls, generate_order_number, quantities_by_item,
    CartItemRef, CartLine, CatalogEntry, CoreError, PaymentStatus, Selection, ShippingInfo,
    ShippingMethod, StockShortfall, Totals,
};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;

use crate::balances::{self, BalanceRow};
use crate::cart::server as server_cart;
use crate::orders::{OrderItemRow, OrderPackageRow, OrderRow, ORDER_COLUMNS};
use crate::{catalog, inventory, DbError};

/// Payment method recorded for orders funded from the user balance.
pub const BALANCE_PAYMENT_METHOD: &str = "balance";
/// Payment method recorded for guest orders that do not name one.
pub const DEFAULT_GUEST_PAYMENT_METHOD: &str = "pay_on_delivery";

/// One line of a guest checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineInput {
    pub item: CartItemRef,
    pub quantity: i32,
    pub selection: Selection,
}

impl From<CartLine> for OrderLineInput {
    fn from(line: CartLine) -> Self {
        Self {
            item: line.item,
            quantity: line.quantity,
            selection: line.selection,
        }
    }
}

/// Who is buying, and where the lines come from.
#[derive(Debug, Clone)]
pub enum Buyer {
    /// Lines are supplied inline; no balance is involved.
    Guest { lines: Vec<OrderLineInput> },
    /// Lines come from the user's server cart; the balance pays.
    User { user_id: i64 },
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub buyer: Buyer,
    pub shipping: ShippingInfo,
    pub shipping_method: ShippingMethod,
    /// Guest-chosen payment method; ignored for balance-funded orders.
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: OrderRow,
    pub items: Vec<OrderItemRow>,
    pub packages: Vec<OrderPackageRow>,
    /// The buyer's balance after the debit; `None` for guests.
    pub balance: Option<BalanceRow>,
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("invalid cart line: {0}")]
    InvalidLine(String),
    #[error("invalid shipping details: {0}")]
    InvalidShipping(CoreError),
    #[error("insufficient stock for {} line(s)", .0.len())]
    InsufficientStock(Vec<StockShortfall>),
    #[error("insufficient funds: balance {current_balance}, total {total}")]
    InsufficientFunds {
        shortfall: Decimal,
        current_balance: Decimal,
        total: Decimal,
    },
    #[error("order could not be saved: {0}")]
    PersistenceFailed(DbError),
}

impl From<DbError> for CheckoutError {
    fn from(err: DbError) -> Self {
        CheckoutError::PersistenceFailed(err)
    }
}

impl From<sqlx::Error> for CheckoutError {
    fn from(err: sqlx::Error) -> Self {
        CheckoutError::PersistenceFailed(DbError::Sqlx(err))
    }
}

/// Places an order.
///
/// # Errors
///
/// Returns [`CheckoutError::InvalidShipping`], [`CheckoutError::EmptyCart`],
/// or [`CheckoutError::InvalidLine`] before any write;
/// [`CheckoutError::InsufficientStock`] or
/// [`CheckoutError::InsufficientFunds`] after locking, with nothing
/// written; or [`CheckoutError::PersistenceFailed`] if the database rejects
/// the transaction (retryable).
pub async fn place_order(
    pool: &PgPool,
    request: &CheckoutRequest,
) -> Result<PlacedOrder, CheckoutError> {
    request
        .shipping
        .validate()
        .map_err(CheckoutError::InvalidShipping)?;

    if let Buyer::Guest { lines } = &request.buyer {
        validate_lines(lines)?;
    }

    let mut tx = pool.begin().await?;

    let (lines, user_id) = match &request.buyer {
        Buyer::Guest { lines } => (lines.clone(), None),
        Buyer::User { user_id } => {
            let lines: Vec<OrderLineInput> = server_cart::load_lines(&mut tx, *user_id, true)
                .await?
                .into_iter()
                .map(OrderLineInput::from)
                .collect();
            validate_lines(&lines)?;
            (lines, Some(*user_id))
        }
    };

    let entries = lock_entries(&mut tx, &lines).await?;

    for line in &lines {
        if let Some(entry) = entries.get(&line.item).filter(|e| e.is_active) {
            entry
                .check_selection(&line.selection)
                .map_err(CheckoutError::InvalidLine)?;
        }
    }

    let requested = quantities_by_item(lines.iter().map(|l| (&l.item, l.quantity)));
    let shortfalls = find_shortfalls(&requested, |item| {
        entries
            .get(item)
            .filter(|e| e.is_active)
            .map(|e| (e.name.clone(), e.stock))
    });
    if !shortfalls.is_empty() {
        tracing::warn!(lines = shortfalls.len(), "checkout rejected: insufficient stock");
        return Err(CheckoutError::InsufficientStock(shortfalls));
    }

    let priced: Vec<(&OrderLineInput, &CatalogEntry)> = lines
        .iter()
        .filter_map(|l| entries.get(&l.item).map(|e| (l, e)))
        .collect();
    let totals = compute_totals(
        priced.iter().map(|(l, e)| (e.price, l.quantity)),
        request.shipping_method,
    );

    let balance = match user_id {
        Some(user_id) => Some(charge_balance(&mut tx, user_id, totals.total).await?),
        None => None,
    };

    let payment_method = match user_id {
        Some(_) => BALANCE_PAYMENT_METHOD.to_string(),
        None => request
            .payment_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_GUEST_PAYMENT_METHOD)
            .to_string(),
    };
    let payment_status = if user_id.is_some() {
        PaymentStatus::Paid
    } else {
        PaymentStatus::Pending
    };

    let order = insert_order(
        &mut tx,
        user_id,
        request,
        &payment_method,
        payment_status,
        &totals,
    )
    .await?;

    let mut items = Vec::new();
    let mut packages = Vec::new();
    for (line, entry) in &priced {
        match line.item {
            CartItemRef::Product { product_id } => {
                items.push(insert_order_item(&mut tx, order.id, product_id, line, entry).await?);
            }
            CartItemRef::Package { package_id } => {
                packages
                    .push(insert_order_package(&mut tx, order.id, package_id, line, entry).await?);
            }
        }
    }

    decrement_stock(&mut tx, &requested).await?;

    if let Some(user_id) = user_id {
        server_cart::delete_lines(&mut tx, user_id).await?;
    }

    tx.commit().await?;

    tracing::info!(
        order_number = %order.order_number,
        user_id = ?user_id,
        total = %order.total,
        lines = lines.len(),
        "order placed"
    );

    Ok(PlacedOrder {
        order,
        items,
        packages,
        balance,
    })
}

fn validate_lines(lines: &[OrderLineInput]) -> Result<(), CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    for line in lines {
        ensure_positive(line.quantity)
            .map_err(|e| CheckoutError::InvalidLine(format!("{}: {e}", line.item)))?;
    }
    Ok(())
}

/// Locks every product in the cart, then every package that is either in
/// the cart or built from a product in the cart.
async fn lock_entries(
    conn: &mut PgConnection,
    lines: &[OrderLineInput],
) -> Result<HashMap<CartItemRef, CatalogEntry>, CheckoutError> {
    let product_ids: Vec<i64> = lines
        .iter()
        .filter_map(|l| l.item.product_id())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut entries = catalog::product_entries(conn, &product_ids, true).await?;

    let mut package_ids: BTreeSet<i64> = lines.iter().filter_map(|l| l.item.package_id()).collect();
    package_ids.extend(inventory::packages_containing(conn, &product_ids).await?);
    let package_ids: Vec<i64> = package_ids.into_iter().collect();

    entries.extend(catalog::package_entries(conn, &package_ids, true).await?);
    Ok(entries)
}

async fn charge_balance(
    conn: &mut PgConnection,
    user_id: i64,
    total: Decimal,
) -> Result<BalanceRow, CheckoutError> {
    let current = balances::lock_balance(conn, user_id).await?;
    if current.balance < total {
        tracing::warn!(user_id, balance = %current.balance, %total, "checkout rejected: insufficient funds");
        return Err(CheckoutError::InsufficientFunds {
            shortfall: total - current.balance,
            current_balance: current.balance,
            total,
        });
    }
    Ok(balances::debit_balance(conn, user_id, total).await?)
}

async fn insert_order(
    conn: &mut PgConnection,
    user_id: Option<i64>,
    request: &CheckoutRequest,
    payment_method: &str,
    payment_status: PaymentStatus,
    totals: &Totals,
) -> Result<OrderRow, DbError> {
    let s = &request.shipping;
    let row = sqlx::query_as::<_, OrderRow>(&format!(
        "INSERT INTO orders \
             (order_number, user_id, first_name, last_name, email, phone, address, city, \
              province, postal_code, shipping_method, payment_method, subtotal, tax, shipping, \
              total, payment_status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(generate_order_number(Utc::now()))
    .bind(user_id)
    .bind(s.first_name.trim())
    .bind(s.last_name.trim())
    .bind(s.email.trim())
    .bind(s.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()))
    .bind(s.address.trim())
    .bind(s.city.trim())
    .bind(s.province.trim())
    .bind(s.postal_code.trim())
    .bind(request.shipping_method.as_str())
    .bind(payment_method)
    .bind(totals.subtotal)
    .bind(totals.tax)
    .bind(totals.shipping)
    .bind(totals.total)
    .bind(payment_status.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

async fn insert_order_item(
    conn: &mut PgConnection,
    order_id: i64,
    product_id: i64,
    line: &OrderLineInput,
    entry: &CatalogEntry,
) -> Result<OrderItemRow, DbError> {
    let row = sqlx::query_as::<_, OrderItemRow>(
        "INSERT INTO order_items \
             (order_id, product_id, name, price, quantity, size, color, subtotal) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id, order_id, product_id, name, price, quantity, size, color, subtotal",
    )
    .bind(order_id)
    .bind(product_id)
    .bind(&entry.name)
    .bind(entry.price)
    .bind(line.quantity)
    .bind(&line.selection.size)
    .bind(&line.selection.color)
    .bind(entry.price * Decimal::from(line.quantity))
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

async fn insert_order_package(
    conn: &mut PgConnection,
    order_id: i64,
    package_id: i64,
    line: &OrderLineInput,
    entry: &CatalogEntry,
) -> Result<OrderPackageRow, DbError> {
    let row = sqlx::query_as::<_, OrderPackageRow>(
        "INSERT INTO order_packages (order_id, package_id, name, price, quantity, subtotal) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, order_id, package_id, name, price, quantity, subtotal",
    )
    .bind(order_id)
    .bind(package_id)
    .bind(&entry.name)
    .bind(entry.price)
    .bind(line.quantity)
    .bind(entry.price * Decimal::from(line.quantity))
    .fetch_one(&mut *conn)
    .await?;

    Ok(row)
}

/// Decrements package stock for package lines and product stock for
/// product lines, then resyncs packages built from the sold products.
/// Package sales leave constituent products untouched.
async fn decrement_stock(
    conn: &mut PgConnection,
    requested: &[(CartItemRef, i32)],
) -> Result<(), DbError> {
    let mut sorted = requested.to_vec();
    sorted.sort_unstable();

    let mut sold_products = Vec::new();
    for (item, quantity) in sorted {
        let table = match item {
            CartItemRef::Product { product_id } => {
                sold_products.push(product_id);
                "products"
            }
            CartItemRef::Package { .. } => "packages",
        };
        sqlx::query(&format!(
            "UPDATE {table} SET stock = stock - $2, updated_at = NOW() WHERE id = $1"
        ))
        .bind(item.id())
        .bind(quantity)
        .execute(&mut *conn)
        .await?;
    }

    inventory::sync_packages_for_products(conn, &sold_products).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(item: CartItemRef, quantity: i32) -> OrderLineInput {
        OrderLineInput {
            item,
            quantity,
            selection: Selection::default(),
        }
    }

    #[test]
    fn empty_guest_cart_is_rejected() {
        assert!(matches!(validate_lines(&[]), Err(CheckoutError::EmptyCart)));
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        let lines = [line(CartItemRef::Product { product_id: 5 }, 0)];
        let err = validate_lines(&lines).unwrap_err();
        assert!(
            matches!(err, CheckoutError::InvalidLine(ref m) if m.contains("product 5")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn cart_line_converts_to_order_line() {
        let cart_line = CartLine {
            id: "7".to_string(),
            item: CartItemRef::Package { package_id: 39 },
            quantity: 2,
            selection: Selection::default(),
        };
        assert_eq!(
            OrderLineInput::from(cart_line),
            line(CartItemRef::Package { package_id: 39 }, 2)
        );
    }
}
