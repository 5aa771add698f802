//! Persistence rules that only hold inside Postgres: conditional wallet debits,
//! stock decrements, coupon redemption limits and the one-active-offer index.
//!
//! Runs against `TEST_DATABASE_URL` and skips when it is unset. Each test works
//! inside a transaction that is never committed, so runs leave no rows behind.

use rust_decimal::Decimal;
use serde_json::json;
use shopfront::domain::aggregates::{CouponError, NewOrder, NewOrderLine, Order, PaymentMethod, WalletError};
use shopfront::store::{coupons, orders, wallet};
use shopfront::ShopError;
use sqlx::{postgres::PgPoolOptions, Connection, PgConnection, PgPool};
use uuid::Uuid;

async fn database() -> Option<PgPool> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };
    let pool = PgPoolOptions::new().max_connections(4).connect(&url).await.expect("connect");
    sqlx::migrate!("./migrations").run(&pool).await.expect("migrate");
    Some(pool)
}

fn unique(prefix: &str) -> String { format!("{prefix}-{}", Uuid::new_v4().simple()) }

async fn seed_user(conn: &mut PgConnection) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO users (id, name, email, password_hash, referral_code, is_verified) VALUES ($1, 'Meera', $2, 'x', $3, TRUE)")
        .bind(id).bind(format!("{}@example.com", unique("meera"))).bind(unique("ref"))
        .execute(&mut *conn)
        .await
        .expect("user");
    id
}

async fn seed_product(conn: &mut PgConnection, stock: i32) -> Uuid {
    let category = Uuid::now_v7();
    let name = unique("Kitchen");
    sqlx::query("INSERT INTO categories (id, name, slug) VALUES ($1, $2, $3)")
        .bind(category).bind(&name).bind(name.to_lowercase())
        .execute(&mut *conn)
        .await
        .expect("category");
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO products (id, name, category_id, price, stock) VALUES ($1, 'Kettle', $2, 250, $3)")
        .bind(id).bind(category).bind(stock)
        .execute(&mut *conn)
        .await
        .expect("product");
    id
}

async fn seed_coupon(conn: &mut PgConnection, usage_limit: Option<i32>) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO coupons (id, code, discount_percentage, max_discount, starts_at, ends_at, usage_limit) \
         VALUES ($1, $2, 10, 100, NOW() - INTERVAL '1 day', NOW() + INTERVAL '1 day', $3)",
    )
    .bind(id).bind(unique("SAVE").to_uppercase()).bind(usage_limit)
    .execute(&mut *conn)
    .await
    .expect("coupon");
    id
}

fn cod_order(user_id: Uuid, product_id: Uuid, quantity: i32) -> Order {
    let new = NewOrder {
        user_id,
        payment_method: PaymentMethod::Cod,
        shipping_address: json!({"city": "Pune"}),
        currency: "INR".into(),
        lines: vec![NewOrderLine { product_id, name: "Kettle".into(), unit_price: Decimal::new(250, 0), sale_price: Decimal::new(250, 0), quantity }],
        coupon: None,
    };
    Order::place(Order::generate_number(), new, Decimal::new(100_000, 0)).expect("order")
}

async fn stock_of(conn: &mut PgConnection, product_id: Uuid) -> i32 {
    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1").bind(product_id).fetch_one(&mut *conn).await.expect("stock")
}

async fn balance_of(conn: &mut PgConnection, user_id: Uuid) -> Decimal {
    sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = $1").bind(user_id).fetch_one(&mut *conn).await.expect("balance")
}

#[tokio::test]
async fn wallet_debit_beyond_balance_changes_nothing() {
    let Some(pool) = database().await else { return };
    let mut tx = pool.begin().await.unwrap();
    let user = seed_user(&mut tx).await;
    wallet::open_wallet(&mut tx, user).await.unwrap();
    wallet::credit(&mut tx, user, Decimal::new(100, 0), "Top up", None).await.unwrap();

    let err = wallet::debit(&mut tx, user, Decimal::new(150, 0), "Order", None).await.unwrap_err();
    assert!(matches!(err, ShopError::Wallet(WalletError::InsufficientBalance { .. })));
    assert_eq!(balance_of(&mut tx, user).await, Decimal::new(100, 0));
    let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions WHERE user_id = $1").bind(user).fetch_one(&mut *tx).await.unwrap();
    assert_eq!(entries, 1);

    let (entry, _) = wallet::debit(&mut tx, user, Decimal::new(100, 0), "Order", None).await.unwrap();
    assert_eq!(entry.balance_after, Decimal::ZERO);
    assert_eq!(balance_of(&mut tx, user).await, Decimal::ZERO);
}

#[tokio::test]
async fn take_stock_refuses_to_oversell() {
    let Some(pool) = database().await else { return };
    let mut tx = pool.begin().await.unwrap();
    let user = seed_user(&mut tx).await;
    let product = seed_product(&mut tx, 1).await;

    let greedy = cod_order(user, product, 2);
    orders::insert_order(&mut tx, &greedy).await.unwrap();
    let err = orders::take_stock(&mut tx, &greedy).await.unwrap_err();
    assert!(matches!(err, ShopError::Conflict(_)));
    assert_eq!(stock_of(&mut tx, product).await, 1);

    let modest = cod_order(user, product, 1);
    orders::insert_order(&mut tx, &modest).await.unwrap();
    orders::take_stock(&mut tx, &modest).await.unwrap();
    assert_eq!(stock_of(&mut tx, product).await, 0);
}

#[tokio::test]
async fn failed_wallet_payment_rolls_back_the_whole_checkout() {
    let Some(pool) = database().await else { return };
    let mut tx = pool.begin().await.unwrap();
    let user = seed_user(&mut tx).await;
    let product = seed_product(&mut tx, 5).await;
    wallet::open_wallet(&mut tx, user).await.unwrap();

    let order = cod_order(user, product, 2);
    {
        let mut checkout = tx.begin().await.unwrap();
        orders::insert_order(&mut checkout, &order).await.unwrap();
        orders::take_stock(&mut checkout, &order).await.unwrap();
        assert_eq!(stock_of(&mut checkout, product).await, 3);
        let err = wallet::debit(&mut checkout, user, order.total, "Payment", Some(order.id)).await.unwrap_err();
        assert!(matches!(err, ShopError::Wallet(WalletError::InsufficientBalance { .. })));
        checkout.rollback().await.unwrap();
    }

    assert_eq!(stock_of(&mut tx, product).await, 5);
    let placed: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)").bind(order.id).fetch_one(&mut *tx).await.unwrap();
    assert!(!placed);
}

#[tokio::test]
async fn coupon_redemption_respects_usage_limit() {
    let Some(pool) = database().await else { return };
    let mut tx = pool.begin().await.unwrap();
    let coupon = seed_coupon(&mut tx, Some(1)).await;
    let (first, second) = (seed_user(&mut tx).await, seed_user(&mut tx).await);

    coupons::redeem(&mut tx, coupon, first, Uuid::now_v7()).await.unwrap();
    let err = coupons::redeem(&mut tx, coupon, second, Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, ShopError::Coupon(CouponError::UsageLimitReached)));
    let used: i32 = sqlx::query_scalar("SELECT used_count FROM coupons WHERE id = $1").bind(coupon).fetch_one(&mut *tx).await.unwrap();
    assert_eq!(used, 1);
}

#[tokio::test]
async fn coupon_redeems_once_per_user() {
    let Some(pool) = database().await else { return };
    let mut tx = pool.begin().await.unwrap();
    let coupon = seed_coupon(&mut tx, None).await;
    let user = seed_user(&mut tx).await;

    coupons::redeem(&mut tx, coupon, user, Uuid::now_v7()).await.unwrap();
    assert!(coupons::already_used(&mut tx, coupon, user).await.unwrap());
    {
        let mut checkout = tx.begin().await.unwrap();
        let err = coupons::redeem(&mut checkout, coupon, user, Uuid::now_v7()).await.unwrap_err();
        assert!(matches!(err, ShopError::Coupon(CouponError::AlreadyUsed)));
        checkout.rollback().await.unwrap();
    }
    let used: i32 = sqlx::query_scalar("SELECT used_count FROM coupons WHERE id = $1").bind(coupon).fetch_one(&mut *tx).await.unwrap();
    assert_eq!(used, 1);
}

#[tokio::test]
async fn one_active_offer_per_product() {
    let Some(pool) = database().await else { return };
    let mut tx = pool.begin().await.unwrap();
    let product = seed_product(&mut tx, 1).await;
    let insert = "INSERT INTO product_offers (id, product_id, discount_percentage, starts_at, ends_at, is_active) \
                  VALUES ($1, $2, $3, NOW(), NOW() + INTERVAL '1 day', $4)";

    sqlx::query(insert).bind(Uuid::now_v7()).bind(product).bind(10).bind(true).execute(&mut *tx).await.unwrap();
    sqlx::query(insert).bind(Uuid::now_v7()).bind(product).bind(20).bind(false).execute(&mut *tx).await.unwrap();

    let mut second = tx.begin().await.unwrap();
    let err = sqlx::query(insert).bind(Uuid::now_v7()).bind(product).bind(30).bind(true).execute(&mut *second).await.unwrap_err();
    let err = ShopError::unique_conflict(err, "taken");
    assert!(matches!(err, ShopError::Conflict(_)));
    assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn locked_order_blocks_a_second_writer() {
    let Some(pool) = database().await else { return };
    let mut seed = pool.begin().await.unwrap();
    let user = seed_user(&mut seed).await;
    let product = seed_product(&mut seed, 3).await;
    let order = cod_order(user, product, 1);
    orders::insert_order(&mut seed, &order).await.unwrap();
    seed.commit().await.unwrap();

    let mut first = pool.begin().await.unwrap();
    orders::lock_order(&mut first, order.id).await.unwrap();

    let mut second = pool.begin().await.unwrap();
    sqlx::query("SET LOCAL lock_timeout = '200ms'").execute(&mut *second).await.unwrap();
    assert!(orders::lock_order(&mut second, order.id).await.is_err());
    second.rollback().await.unwrap();

    first.rollback().await.unwrap();
    let mut third = pool.begin().await.unwrap();
    assert_eq!(orders::lock_order(&mut third, order.id).await.unwrap().id, order.id);
}
