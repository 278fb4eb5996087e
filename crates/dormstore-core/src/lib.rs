//! Domain model for the dorm store: catalog items, package composition,
//! cart lines, checkout arithmetic, order status, and app configuration.
//!
//! Nothing in this crate touches the database; `dormstore-db` drives these
//! types through Postgres transactions.

pub mod app_config;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod inventory;
pub mod orders;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use cart::{
    ensure_positive, merge_key, merge_line, quantities_by_item, CartItemRef, CartLine, ItemKind,
    Selection,
};
pub use catalog::{option_list, CatalogEntry};
pub use checkout::{
    compute_totals, find_shortfalls, round_money, ShippingInfo, ShippingMethod, StockShortfall,
    Totals, TAX_RATE,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use inventory::{binding_component, resolve_package_stock, ComponentStock};
pub use orders::{generate_order_number, OrderStatus, PaymentStatus};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid item kind: {0}")]
    InvalidItemKind(String),
    #[error("invalid order status: {0}")]
    InvalidOrderStatus(String),
    #[error("invalid payment status: {0}")]
    InvalidPaymentStatus(String),
    #[error("unknown shipping method: {0}")]
    UnknownShippingMethod(String),
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),
    #[error("{field} must not be empty")]
    MissingField { field: &'static str },
}
