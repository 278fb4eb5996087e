//! Offline tests for dormstore-db pool configuration and public types.
//! These tests do not require a live database connection.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use dormstore_core::{AppConfig, CartItemRef, CartLine, Environment, Selection};
use dormstore_db::{CheckoutError, DbError, OrderLineInput, PoolConfig};
use rust_decimal::Decimal;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        token_hash_salt: "salt".to_string(),
        admin_keys: vec!["admin".to_string()],
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        rate_limit_max_requests: 120,
        rate_limit_window_secs: 60,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn derived_stock_error_names_the_package() {
    let err = DbError::DerivedStock { package_id: 39 };
    assert!(err.to_string().contains("package 39"));
    assert!(!err.is_unique_violation());
    assert!(!err.is_foreign_key_violation());
}

#[test]
fn insufficient_funds_message_carries_amounts() {
    let err = CheckoutError::InsufficientFunds {
        shortfall: Decimal::new(7350, 2),
        current_balance: Decimal::new(5000, 2),
        total: Decimal::new(12350, 2),
    };
    let message = err.to_string();
    assert!(message.contains("50.00"), "got {message}");
    assert!(message.contains("123.50"), "got {message}");
}

#[test]
fn persistence_failures_wrap_sqlx_errors() {
    let err = CheckoutError::from(sqlx::Error::PoolTimedOut);
    assert!(matches!(
        err,
        CheckoutError::PersistenceFailed(DbError::Sqlx(sqlx::Error::PoolTimedOut))
    ));
}

#[test]
fn order_line_keeps_selection_from_cart_line() {
    let line = CartLine {
        id: "12".to_string(),
        item: CartItemRef::Product { product_id: 5 },
        quantity: 2,
        selection: Selection::new(Some("M".to_string()), Some("Navy".to_string())),
    };
    let input = OrderLineInput::from(line);
    assert_eq!(input.quantity, 2);
    assert_eq!(input.selection.size.as_deref(), Some("M"));
    assert_eq!(input.selection.color.as_deref(), Some("Navy"));
}
