//! Live integration tests for dormstore-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/dormstore-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.

use dormstore_core::{
    CartItemRef, OrderStatus, PaymentStatus, Selection, ShippingInfo, ShippingMethod,
};
use dormstore_db::{
    add_item, check_package_stock, create_package, create_product, create_user, delete_product,
    delete_package_item, get_balance, get_cart, get_package, get_product, issue_token,
    list_order_items, list_order_packages, package_details, place_order, replace_package_items,
    resolve_token, set_payment_status, sync_all_packages, top_up_balance, update_order_status,
    update_package, update_product, update_quantity, Buyer, CartError, CheckoutError,
    CheckoutRequest, DbError, NewPackage, NewProduct, OrderLineInput, PackageUpdate,
    ProductUpdate, ServerCart, TransitionError,
};
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn dec(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

async fn insert_test_product(pool: &sqlx::PgPool, name: &str, price_cents: i64, stock: i32) -> i64 {
    create_product(
        pool,
        &NewProduct {
            name: name.to_string(),
            price: dec(price_cents),
            category: Some("essentials".to_string()),
            description: None,
            size: None,
            color: None,
            image_url: None,
            stock,
            is_active: true,
        },
    )
    .await
    .unwrap_or_else(|e| panic!("insert_test_product failed for '{name}': {e}"))
    .id
}

async fn insert_test_package(
    pool: &sqlx::PgPool,
    name: &str,
    price_cents: i64,
    items: Vec<(i64, i32)>,
) -> i64 {
    create_package(
        pool,
        &NewPackage {
            name: name.to_string(),
            price: dec(price_cents),
            category: None,
            description: None,
            image_url: None,
            stock: 0,
            is_active: true,
            items,
        },
    )
    .await
    .unwrap_or_else(|e| panic!("insert_test_package failed for '{name}': {e}"))
    .id
}

async fn insert_test_user(pool: &sqlx::PgPool, email: &str) -> i64 {
    create_user(pool, email, Some("Test User"))
        .await
        .unwrap_or_else(|e| panic!("insert_test_user failed for '{email}': {e}"))
        .id
}

async fn product_stock(pool: &sqlx::PgPool, id: i64) -> i32 {
    get_product(pool, id)
        .await
        .expect("get_product failed")
        .expect("product missing")
        .stock
}

async fn package_stock(pool: &sqlx::PgPool, id: i64) -> i32 {
    get_package(pool, id)
        .await
        .expect("get_package failed")
        .expect("package missing")
        .stock
}

async fn order_count(pool: &sqlx::PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(pool)
        .await
        .expect("count orders failed")
}

fn shipping() -> ShippingInfo {
    ShippingInfo {
        first_name: "Sam".to_string(),
        last_name: "Lee".to_string(),
        email: "sam@example.com".to_string(),
        phone: None,
        address: "1 College St".to_string(),
        city: "Toronto".to_string(),
        province: "ON".to_string(),
        postal_code: "M5S 1A1".to_string(),
    }
}

fn guest_request(lines: Vec<(CartItemRef, i32)>) -> CheckoutRequest {
    CheckoutRequest {
        buyer: Buyer::Guest {
            lines: lines
                .into_iter()
                .map(|(item, quantity)| OrderLineInput {
                    item,
                    quantity,
                    selection: Selection::default(),
                })
                .collect(),
        },
        shipping: shipping(),
        shipping_method: ShippingMethod::Standard,
        payment_method: None,
    }
}

fn user_request(user_id: i64) -> CheckoutRequest {
    CheckoutRequest {
        buyer: Buyer::User { user_id },
        shipping: shipping(),
        shipping_method: ShippingMethod::Standard,
        payment_method: Some("ignored".to_string()),
    }
}

fn product(id: i64) -> CartItemRef {
    CartItemRef::Product { product_id: id }
}

fn package(id: i64) -> CartItemRef {
    CartItemRef::Package { package_id: id }
}

// ---------------------------------------------------------------------------
// Section 1: Derived package stock
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn composite_package_stock_follows_scarcest_component(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 10).await;
    let sheets = insert_test_product(&pool, "Twin XL Sheets", 3000, 7).await;
    let kit = insert_test_package(&pool, "Starter Kit", 5000, vec![(lamp, 1), (sheets, 2)]).await;

    assert_eq!(package_stock(&pool, kit).await, 3);

    update_product(
        &pool,
        lamp,
        &ProductUpdate {
            stock: Some(2),
            ..ProductUpdate::default()
        },
    )
    .await
    .expect("update_product failed");
    assert_eq!(package_stock(&pool, kit).await, 2);

    delete_product(&pool, sheets)
        .await
        .expect("delete_product failed");
    assert_eq!(package_stock(&pool, kit).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn deactivating_a_component_zeroes_the_package(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 10).await;
    let kit = insert_test_package(&pool, "Lamp Kit", 3000, vec![(lamp, 1)]).await;
    assert_eq!(package_stock(&pool, kit).await, 10);

    update_product(
        &pool,
        lamp,
        &ProductUpdate {
            is_active: Some(false),
            ..ProductUpdate::default()
        },
    )
    .await
    .expect("update_product failed");
    assert_eq!(package_stock(&pool, kit).await, 0);

    update_product(
        &pool,
        lamp,
        &ProductUpdate {
            is_active: Some(true),
            ..ProductUpdate::default()
        },
    )
    .await
    .expect("update_product failed");
    assert_eq!(package_stock(&pool, kit).await, 10);
}

#[sqlx::test(migrations = "../../migrations")]
async fn derived_stock_holds_under_random_mutations(pool: sqlx::PgPool) {
    let a = insert_test_product(&pool, "A", 100, 20).await;
    let b = insert_test_product(&pool, "B", 100, 20).await;
    let c = insert_test_product(&pool, "C", 100, 20).await;
    let kit = insert_test_package(&pool, "Kit", 500, vec![(a, 1), (b, 3)]).await;

    for _ in 0..40 {
        let choice = rand::random::<u8>() % 4;
        match choice {
            0 | 1 => {
                let target = [a, b, c][usize::from(rand::random::<u8>() % 3)];
                let stock = i32::from(rand::random::<u8>() % 30);
                update_product(
                    &pool,
                    target,
                    &ProductUpdate {
                        stock: Some(stock),
                        ..ProductUpdate::default()
                    },
                )
                .await
                .expect("update_product failed");
            }
            2 => {
                let quantity = 1 + i32::from(rand::random::<u8>() % 4);
                replace_package_items(&pool, kit, &[(a, 1), (c, quantity)])
                    .await
                    .expect("replace_package_items failed");
            }
            _ => {
                replace_package_items(&pool, kit, &[(a, 2), (b, 1), (c, 1)])
                    .await
                    .expect("replace_package_items failed");
            }
        }

        let drift = check_package_stock(&pool)
            .await
            .expect("check_package_stock failed");
        assert!(drift.is_empty(), "drift after mutation: {drift:?}");

        let details = package_details(&pool, kit)
            .await
            .expect("package_details failed");
        let brute = details
            .components
            .iter()
            .map(|c| c.product_stock.unwrap_or(0) / c.quantity)
            .min()
            .unwrap_or(details.package.stock);
        assert_eq!(details.package.stock, brute);
        assert_eq!(details.resolved_stock, brute);
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn composite_package_stock_is_not_writable(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 4).await;
    let kit = insert_test_package(&pool, "Lamp Kit", 3000, vec![(lamp, 1)]).await;

    let err = update_package(
        &pool,
        kit,
        &PackageUpdate {
            stock: Some(50),
            ..PackageUpdate::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DbError::DerivedStock { package_id } if package_id == kit));
    assert_eq!(package_stock(&pool, kit).await, 4);
}

#[sqlx::test(migrations = "../../migrations")]
async fn removing_last_component_makes_package_standalone(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 6).await;
    let kit = insert_test_package(&pool, "Lamp Kit", 3000, vec![(lamp, 2)]).await;
    assert_eq!(package_stock(&pool, kit).await, 3);

    let items = delete_package_item(&pool, kit, lamp)
        .await
        .expect("delete_package_item failed");
    assert!(items.is_empty());

    let row = get_package(&pool, kit).await.unwrap().unwrap();
    assert!(!row.is_composite);
    assert_eq!(row.stock, 3);

    let updated = update_package(
        &pool,
        kit,
        &PackageUpdate {
            stock: Some(12),
            ..PackageUpdate::default()
        },
    )
    .await
    .expect("standalone stock should be writable");
    assert_eq!(updated.stock, 12);
}

#[sqlx::test(migrations = "../../migrations")]
async fn sync_all_repairs_manual_drift(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 5).await;
    let kit = insert_test_package(&pool, "Lamp Kit", 3000, vec![(lamp, 1)]).await;

    sqlx::query("UPDATE packages SET stock = 99 WHERE id = $1")
        .bind(kit)
        .execute(&pool)
        .await
        .unwrap();
    let drift = check_package_stock(&pool).await.unwrap();
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].stored, 99);
    assert_eq!(drift[0].derived, 5);

    let changes = sync_all_packages(&pool).await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].previous, 99);
    assert_eq!(changes[0].current, 5);
    assert!(check_package_stock(&pool).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Section 2: Server cart
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn adding_same_item_twice_merges_lines(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "merge@example.com").await;
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 10).await;
    let mut cart = ServerCart::new(pool.clone(), user);

    add_item(&pool, &mut cart, product(lamp), Selection::default(), 2)
        .await
        .expect("first add failed");
    add_item(&pool, &mut cart, product(lamp), Selection::default(), 3)
        .await
        .expect("second add failed");

    let view = get_cart(&pool, &mut cart).await.expect("get_cart failed");
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.lines[0].line.quantity, 5);
    assert_eq!(view.lines[0].name, "Desk Lamp");
    assert_eq!(view.subtotal, dec(12500));
    assert_eq!(view.item_count, 5);
}

#[sqlx::test(migrations = "../../migrations")]
async fn add_checks_stock_against_merged_quantity(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "stock@example.com").await;
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 4).await;
    let mut cart = ServerCart::new(pool.clone(), user);

    add_item(&pool, &mut cart, product(lamp), Selection::default(), 3)
        .await
        .expect("add failed");
    let err = add_item(&pool, &mut cart, product(lamp), Selection::default(), 2)
        .await
        .unwrap_err();
    match err {
        CartError::OutOfStock {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 5);
            assert_eq!(available, 4);
        }
        other => panic!("expected OutOfStock, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn update_quantity_zero_removes_idempotently_and_unknown_line_fails(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "update@example.com").await;
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 4).await;
    let mut cart = ServerCart::new(pool.clone(), user);

    let line = add_item(&pool, &mut cart, product(lamp), Selection::default(), 1)
        .await
        .unwrap();

    let err = update_quantity(&pool, &mut cart, &line.id, 9)
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::OutOfStock { .. }));

    let removed = update_quantity(&pool, &mut cart, &line.id, 0).await.unwrap();
    assert!(removed.is_none());
    assert!(get_cart(&pool, &mut cart).await.unwrap().lines.is_empty());

    let again = update_quantity(&pool, &mut cart, &line.id, 0).await.unwrap();
    assert!(again.is_none());

    let err = update_quantity(&pool, &mut cart, &line.id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CartError::LineNotFound { .. }));
}

#[sqlx::test(migrations = "../../migrations")]
async fn reading_cart_drops_deleted_items(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "prune@example.com").await;
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 4).await;
    let mug = insert_test_product(&pool, "Mug", 900, 4).await;
    let mut cart = ServerCart::new(pool.clone(), user);

    add_item(&pool, &mut cart, product(lamp), Selection::default(), 1)
        .await
        .unwrap();
    add_item(&pool, &mut cart, product(mug), Selection::default(), 1)
        .await
        .unwrap();
    delete_product(&pool, mug).await.unwrap();

    let view = get_cart(&pool, &mut cart).await.unwrap();
    assert_eq!(view.lines.len(), 1);
    assert_eq!(view.removed_items.len(), 1);
    assert_eq!(view.removed_items[0].name.as_deref(), Some("Mug"));

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
        .bind(user)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

// ---------------------------------------------------------------------------
// Section 3: Checkout
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn user_checkout_debits_balance_and_clears_cart(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "buyer@example.com").await;
    let hoodie = insert_test_product(&pool, "Hoodie", 5000, 5).await;
    top_up_balance(&pool, user, dec(20000)).await.unwrap();

    let mut cart = ServerCart::new(pool.clone(), user);
    add_item(&pool, &mut cart, product(hoodie), Selection::default(), 2)
        .await
        .unwrap();

    let placed = place_order(&pool, &user_request(user))
        .await
        .expect("place_order failed");

    assert_eq!(placed.order.subtotal, dec(10000));
    assert_eq!(placed.order.tax, dec(1300));
    assert_eq!(placed.order.shipping, dec(1050));
    assert_eq!(placed.order.total, dec(12350));
    assert_eq!(placed.order.payment_status, "paid");
    assert_eq!(placed.order.payment_method, "balance");
    assert_eq!(placed.order.order_status, "confirmed");
    assert!(placed.order.order_number.starts_with("DS-"));
    assert_eq!(placed.items.len(), 1);

    let balance = placed.balance.expect("user order should report balance");
    assert_eq!(balance.balance, dec(7650));
    assert_eq!(balance.total_spent, dec(12350));

    assert_eq!(product_stock(&pool, hoodie).await, 3);
    assert!(get_cart(&pool, &mut cart).await.unwrap().lines.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn insufficient_funds_leaves_everything_untouched(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "short@example.com").await;
    let hoodie = insert_test_product(&pool, "Hoodie", 5000, 5).await;
    top_up_balance(&pool, user, dec(5000)).await.unwrap();

    let mut cart = ServerCart::new(pool.clone(), user);
    add_item(&pool, &mut cart, product(hoodie), Selection::default(), 2)
        .await
        .unwrap();

    let err = place_order(&pool, &user_request(user)).await.unwrap_err();
    match err {
        CheckoutError::InsufficientFunds {
            shortfall,
            current_balance,
            total,
        } => {
            assert_eq!(shortfall, dec(7350));
            assert_eq!(current_balance, dec(5000));
            assert_eq!(total, dec(12350));
        }
        other => panic!("expected InsufficientFunds, got {other:?}"),
    }

    assert_eq!(get_balance(&pool, user).await.unwrap().balance, dec(5000));
    assert_eq!(product_stock(&pool, hoodie).await, 5);
    assert_eq!(order_count(&pool).await, 0);
    assert_eq!(get_cart(&pool, &mut cart).await.unwrap().lines.len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn user_without_balance_row_has_zero_funds(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "new@example.com").await;
    let mug = insert_test_product(&pool, "Mug", 900, 5).await;
    let mut cart = ServerCart::new(pool.clone(), user);
    add_item(&pool, &mut cart, product(mug), Selection::default(), 1)
        .await
        .unwrap();

    let err = place_order(&pool, &user_request(user)).await.unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::InsufficientFunds { current_balance, .. } if current_balance == Decimal::ZERO
    ));
}

#[sqlx::test(migrations = "../../migrations")]
async fn user_checkout_with_empty_cart_fails(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "empty@example.com").await;
    let err = place_order(&pool, &user_request(user)).await.unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyCart));
}

#[sqlx::test(migrations = "../../migrations")]
async fn guest_checkout_decrements_stock_without_balance(pool: sqlx::PgPool) {
    let tee = insert_test_product(&pool, "Campus Tee", 2000, 5).await;

    let placed = place_order(&pool, &guest_request(vec![(product(tee), 2)]))
        .await
        .expect("guest checkout failed");

    assert!(placed.balance.is_none());
    assert!(placed.order.user_id.is_none());
    assert_eq!(placed.order.payment_status, "pending");
    assert_eq!(placed.order.subtotal, dec(4000));
    assert_eq!(product_stock(&pool, tee).await, 3);

    let items = list_order_items(&pool, placed.order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].price, dec(2000));
    assert_eq!(items[0].subtotal, dec(4000));
}

#[sqlx::test(migrations = "../../migrations")]
async fn package_sale_leaves_constituents_alone(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 3).await;
    let sheets = insert_test_product(&pool, "Twin XL Sheets", 3000, 6).await;
    let kit = insert_test_package(&pool, "Starter Kit", 5000, vec![(lamp, 1), (sheets, 2)]).await;
    assert_eq!(package_stock(&pool, kit).await, 3);

    let placed = place_order(&pool, &guest_request(vec![(package(kit), 1)]))
        .await
        .expect("package checkout failed");

    assert_eq!(package_stock(&pool, kit).await, 2);
    assert_eq!(product_stock(&pool, lamp).await, 3);
    assert_eq!(product_stock(&pool, sheets).await, 6);

    let packages = list_order_packages(&pool, placed.order.id).await.unwrap();
    assert_eq!(packages.len(), 1);
    assert_eq!(packages[0].name, "Starter Kit");
}

#[sqlx::test(migrations = "../../migrations")]
async fn product_sale_resyncs_dependent_packages(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 4).await;
    let kit = insert_test_package(&pool, "Lamp Kit", 3000, vec![(lamp, 2)]).await;
    assert_eq!(package_stock(&pool, kit).await, 2);

    place_order(&pool, &guest_request(vec![(product(lamp), 3)]))
        .await
        .expect("checkout failed");

    assert_eq!(product_stock(&pool, lamp).await, 1);
    assert_eq!(package_stock(&pool, kit).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn insufficient_stock_names_offending_lines(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 1).await;
    let mug = insert_test_product(&pool, "Mug", 900, 10).await;

    let err = place_order(
        &pool,
        &guest_request(vec![(product(lamp), 2), (product(mug), 1)]),
    )
    .await
    .unwrap_err();

    match err {
        CheckoutError::InsufficientStock(shortfalls) => {
            assert_eq!(shortfalls.len(), 1);
            assert_eq!(shortfalls[0].item, product(lamp));
            assert_eq!(shortfalls[0].requested, 2);
            assert_eq!(shortfalls[0].available, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(product_stock(&pool, mug).await, 10);
    assert_eq!(order_count(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_checkouts_never_oversell(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 3).await;

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                place_order(&pool, &guest_request(vec![(product(lamp), 1)])).await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let mut placed = 0;
    for result in results {
        match result.expect("task panicked") {
            Ok(_) => placed += 1,
            Err(CheckoutError::InsufficientStock(_)) => {}
            Err(other) => panic!("unexpected checkout error: {other:?}"),
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(product_stock(&pool, lamp).await, 0);
    assert_eq!(order_count(&pool).await, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn concurrent_package_checkouts_never_oversell(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 10).await;
    let sheets = insert_test_product(&pool, "Twin XL Sheets", 3000, 6).await;
    let kit = insert_test_package(&pool, "Starter Kit", 5000, vec![(lamp, 1), (sheets, 2)]).await;
    assert_eq!(package_stock(&pool, kit).await, 3);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                place_order(&pool, &guest_request(vec![(package(kit), 1)])).await
            })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    let mut placed = 0;
    for result in results {
        match result.expect("task panicked") {
            Ok(_) => placed += 1,
            Err(CheckoutError::InsufficientStock(_)) => {}
            Err(other) => panic!("unexpected checkout error: {other:?}"),
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(package_stock(&pool, kit).await, 0);
    assert_eq!(product_stock(&pool, lamp).await, 10);
    assert_eq!(product_stock(&pool, sheets).await, 6);
    assert_eq!(order_count(&pool).await, 3);
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_and_composition_edits_run_concurrently(pool: sqlx::PgPool) {
    let lamp = insert_test_product(&pool, "Desk Lamp", 2500, 200).await;
    let sheets = insert_test_product(&pool, "Twin XL Sheets", 3000, 50).await;
    let kit = insert_test_package(&pool, "Lamp Kit", 3000, vec![(lamp, 1)]).await;

    let rounds = 40;
    for round in 0..rounds {
        let items = if round % 2 == 0 {
            vec![(lamp, 1), (sheets, 1)]
        } else {
            vec![(lamp, 2)]
        };

        let checkout_pool = pool.clone();
        let checkout = tokio::spawn(async move {
            place_order(&checkout_pool, &guest_request(vec![(product(lamp), 1)])).await
        });
        let edit_pool = pool.clone();
        let edit =
            tokio::spawn(async move { replace_package_items(&edit_pool, kit, &items).await });

        let (checkout, edit) = tokio::join!(checkout, edit);
        checkout
            .expect("task panicked")
            .unwrap_or_else(|e| panic!("checkout failed in round {round}: {e:?}"));
        edit.expect("task panicked")
            .unwrap_or_else(|e| panic!("composition edit failed in round {round}: {e:?}"));
    }

    assert_eq!(product_stock(&pool, lamp).await, 200 - rounds);
    assert_eq!(order_count(&pool).await, i64::from(rounds));
    assert!(check_package_stock(&pool).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Section 4: Order status
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn order_status_moves_only_forward(pool: sqlx::PgPool) {
    let mug = insert_test_product(&pool, "Mug", 900, 10).await;
    let placed = place_order(&pool, &guest_request(vec![(product(mug), 1)]))
        .await
        .unwrap();
    let number = placed.order.order_number;

    let row = update_order_status(&pool, &number, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(row.order_status, "processing");

    let row = update_order_status(&pool, &number, OrderStatus::InTransit)
        .await
        .unwrap();
    assert_eq!(row.order_status, "in transit");

    let err = update_order_status(&pool, &number, OrderStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransitionError::Invalid {
            from: OrderStatus::InTransit,
            to: OrderStatus::Shipped
        }
    ));

    let err = update_order_status(&pool, &number, OrderStatus::InTransit)
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::Invalid { .. }));

    let err = update_order_status(&pool, "DS-00000000-MISSING0", OrderStatus::Delivered)
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::NotFound));

    let row = set_payment_status(&pool, &number, PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(row.payment_status, "paid");
    assert_eq!(row.order_status, "in transit");
}

// ---------------------------------------------------------------------------
// Section 5: Users and balances
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn issued_token_resolves_to_user(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "token@example.com").await;
    let token = issue_token(&pool, "salt", user, None).await.unwrap();

    let resolved = resolve_token(&pool, "salt", &token).await.unwrap();
    assert_eq!(resolved.map(|u| u.id), Some(user));
    assert!(resolve_token(&pool, "other-salt", &token)
        .await
        .unwrap()
        .is_none());

    let expired = issue_token(&pool, "salt", user, Some(-1)).await.unwrap();
    assert!(resolve_token(&pool, "salt", &expired).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn top_up_validates_amount_and_user(pool: sqlx::PgPool) {
    let user = insert_test_user(&pool, "topup@example.com").await;

    assert!(matches!(
        top_up_balance(&pool, user, Decimal::ZERO).await,
        Err(DbError::Invalid(_))
    ));
    assert!(matches!(
        top_up_balance(&pool, 999_999, dec(100)).await,
        Err(DbError::NotFound)
    ));

    top_up_balance(&pool, user, dec(1000)).await.unwrap();
    let row = top_up_balance(&pool, user, dec(250)).await.unwrap();
    assert_eq!(row.balance, dec(1250));
    assert_eq!(row.total_spent, Decimal::ZERO);
}
