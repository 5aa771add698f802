//! Checkout, customer order actions, online payment and the admin order desk.

use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::api::addresses::Address;
use crate::api::extract::{AdminUser, CurrentUser};
use crate::api::{Page, Paginated};
use crate::domain::aggregates::{Actor, CartError, NewOrder, NewOrderLine, Order, OrderError, OrderStatus, PaymentMethod};
use crate::domain::value_objects::Money;
use crate::error::{Result, ShopError};
use crate::services::PaymentGateway;
use crate::store::cart::{self as cart_store, CartOwner};
use crate::store::{catalog, coupons, offers, orders, wallet};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/return", post(request_return))
        .route("/orders/:id/payment/verify", post(verify_payment))
        .route("/orders/:id/payment/retry", post(retry_payment))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(admin_list_orders))
        .route("/orders/:id", get(admin_get_order))
        .route("/orders/:id/status", put(admin_update_status))
        .route("/orders/:id/return/approve", post(admin_approve_return))
        .route("/orders/:id/return/reject", post(admin_reject_return))
}

#[derive(Debug, Deserialize)] pub struct CheckoutRequest { pub address_id: Uuid, pub payment_method: PaymentMethod }
#[derive(Debug, Deserialize, Validate)] pub struct ReturnRequest { #[validate(length(min = 1, max = 500))] pub reason: String }
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1))] pub razorpay_order_id: String,
    #[validate(length(min = 1))] pub razorpay_payment_id: String,
    #[validate(length(min = 1))] pub razorpay_signature: String,
}
#[derive(Debug, Deserialize)] pub struct StatusRequest { pub status: OrderStatus }
#[derive(Debug, Deserialize)] pub struct OrderQuery { pub status: Option<OrderStatus>, pub page: Option<u32>, pub per_page: Option<u32> }

/// What the client needs to open the gateway's checkout widget.
#[derive(Debug, Serialize)]
pub struct PaymentIntent { pub gateway_order_id: String, pub amount: i64, pub currency: String, pub key_id: String }

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentIntent>,
}

/// Opens a gateway order for `order` and attaches its id; the caller persists the order.
async fn request_intent(gateway: &dyn PaymentGateway, order: &mut Order) -> Result<PaymentIntent> {
    let amount = Money::new(order.total, &order.currency);
    let created = gateway.create_order(&amount, &order.order_number).await?;
    order.attach_gateway_order(created.id.clone());
    Ok(PaymentIntent { gateway_order_id: created.id, amount: created.amount, currency: created.currency, key_id: gateway.key_id().to_string() })
}

#[instrument(skip(s, r), fields(user_id = %user.id, method = ?r.payment_method))]
async fn checkout(State(s): State<AppState>, user: CurrentUser, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<CheckoutResponse>)> {
    let gateway = match r.payment_method {
        PaymentMethod::Razorpay => Some(s.payments()?.clone()),
        PaymentMethod::Cod | PaymentMethod::Wallet => None,
    };
    let now = Utc::now();
    let currency = s.config.currency.as_str();
    let mut tx = s.db.begin().await?;

    let address = sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE id = $1 AND user_id = $2")
        .bind(r.address_id).bind(user.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ShopError::NotFound("Address"))?;
    let owner = CartOwner::User(user.id);
    let mut cart = cart_store::find_cart(&mut tx, &owner).await?
        .filter(|c| !c.is_empty())
        .ok_or(CartError::Empty)?;

    let ids: Vec<Uuid> = cart.items().iter().map(|i| i.product_id).collect();
    let rows = catalog::lock_products(&mut tx, &ids).await?;
    let book = offers::load_offer_book(&mut tx).await?;
    let mut lines = Vec::with_capacity(ids.len());
    for item in cart.items() {
        let row = rows.iter().find(|r| r.product.id == item.product_id).ok_or(CartError::ProductUnavailable)?;
        row.product.ensure_purchasable(item.quantity, row.category_listed)?;
        let priced = row.priced(&book, currency, now);
        lines.push(NewOrderLine {
            product_id: row.product.id,
            name: row.product.name.clone(),
            unit_price: priced.price.amount(),
            sale_price: priced.sale_price.amount(),
            quantity: item.quantity,
        });
    }
    let subtotal: Decimal = lines.iter().map(|l| l.sale_price * Decimal::from(l.quantity)).sum();
    let coupon = match cart.coupon_code() {
        Some(code) => Some(coupons::evaluate(&mut tx, code, Some(user.id), subtotal, now).await?),
        None => None,
    };

    let new = NewOrder {
        user_id: user.id,
        payment_method: r.payment_method,
        shipping_address: address.snapshot(),
        currency: currency.to_string(),
        lines,
        coupon: coupon.as_ref().map(|(c, discount)| (c.code.clone(), *discount)),
    };
    let mut order = Order::place(Order::generate_number(), new, s.config.cod_limit)?;
    orders::insert_order(&mut tx, &order).await?;
    orders::take_stock(&mut tx, &order).await?;
    if let Some((c, _)) = &coupon {
        coupons::redeem(&mut tx, c.id, user.id, order.id).await?;
    }
    cart.clear();
    cart_store::save(&mut tx, &cart).await?;

    let mut events = order.take_events();
    if order.payment_method == PaymentMethod::Wallet && order.total > Decimal::ZERO {
        let description = format!("Payment for order {}", order.order_number);
        let (_, wallet_events) = wallet::debit(&mut tx, user.id, order.total, &description, Some(order.id)).await?;
        events.extend(wallet_events);
    }
    tx.commit().await?;
    info!(order_id = %order.id, number = %order.order_number, total = %order.total, "order placed");

    let payment = match gateway {
        Some(gateway) if order.awaits_online_payment() => {
            let intent = match request_intent(gateway.as_ref(), &mut order).await {
                Ok(intent) => Some(intent),
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "gateway order failed, payment can be retried");
                    order.fail_payment()?;
                    None
                }
            };
            let mut conn = s.db.acquire().await?;
            orders::save_state(&mut conn, &order).await?;
            intent
        }
        _ => None,
    };
    events.extend(order.take_events());
    s.events.publish_all(events).await;
    Ok((StatusCode::CREATED, Json(CheckoutResponse { order, payment })))
}

async fn list_orders(State(s): State<AppState>, user: CurrentUser, Query(page): Query<Page>) -> Result<Json<Paginated<Order>>> {
    let data = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3")
        .bind(user.id).bind(page.limit()).bind(page.offset())
        .fetch_all(&s.db)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1").bind(user.id).fetch_one(&s.db).await?;
    Ok(Json(page.wrap(data, total)))
}

async fn get_order(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    let mut conn = s.db.acquire().await?;
    let order = orders::find_order(&mut conn, id).await?;
    if order.user_id != user.id { return Err(ShopError::NotFound("Order")); }
    Ok(Json(order))
}

/// Locks the caller's own order; another customer's order reads as missing.
async fn lock_own_order(conn: &mut sqlx::PgConnection, user: &CurrentUser, id: Uuid) -> Result<Order> {
    let order = orders::lock_order(conn, id).await?;
    if order.user_id != user.id { return Err(ShopError::NotFound("Order")); }
    Ok(order)
}

#[instrument(skip(s), fields(user_id = %user.id))]
async fn cancel_order(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    let mut tx = s.db.begin().await?;
    let mut order = lock_own_order(&mut tx, &user, id).await?;
    let settlement = order.cancel(Actor::Customer)?;
    orders::save_state(&mut tx, &order).await?;
    let mut events = order.take_events();
    events.extend(orders::settle(&mut tx, &order, &settlement).await?);
    tx.commit().await?;
    info!(order_id = %order.id, refund = ?settlement.refund, "order cancelled by customer");
    s.events.publish_all(events).await;
    Ok(Json(order))
}

#[instrument(skip(s, r), fields(user_id = %user.id))]
async fn request_return(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>, Json(r): Json<ReturnRequest>) -> Result<Json<Order>> {
    r.validate()?;
    let mut tx = s.db.begin().await?;
    let mut order = lock_own_order(&mut tx, &user, id).await?;
    order.request_return(&r.reason, Utc::now(), s.config.return_window_days)?;
    orders::save_state(&mut tx, &order).await?;
    tx.commit().await?;
    s.events.publish_all(order.take_events()).await;
    Ok(Json(order))
}

#[instrument(skip(s, r), fields(user_id = %user.id))]
async fn verify_payment(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>, Json(r): Json<VerifyPaymentRequest>) -> Result<Json<Order>> {
    r.validate()?;
    let gateway = s.payments()?.clone();
    let mut tx = s.db.begin().await?;
    let mut order = lock_own_order(&mut tx, &user, id).await?;
    if !order.awaits_online_payment() { return Err(OrderError::NotAwaitingPayment.into()); }
    if order.gateway_order_id.as_deref() != Some(r.razorpay_order_id.as_str()) {
        return Err(ShopError::BadRequest("Payment does not belong to this order".into()));
    }

    if !gateway.verify_signature(&r.razorpay_order_id, &r.razorpay_payment_id, &r.razorpay_signature) {
        order.fail_payment()?;
        orders::save_state(&mut tx, &order).await?;
        tx.commit().await?;
        warn!(order_id = %order.id, "payment signature rejected");
        s.events.publish_all(order.take_events()).await;
        return Err(ShopError::BadRequest("Payment verification failed".into()));
    }

    order.confirm_payment(r.razorpay_payment_id)?;
    orders::save_state(&mut tx, &order).await?;
    tx.commit().await?;
    info!(order_id = %order.id, "online payment confirmed");
    s.events.publish_all(order.take_events()).await;
    Ok(Json(order))
}

#[instrument(skip(s), fields(user_id = %user.id))]
async fn retry_payment(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<CheckoutResponse>> {
    let gateway = s.payments()?.clone();
    let mut tx = s.db.begin().await?;
    let mut order = lock_own_order(&mut tx, &user, id).await?;
    if !order.awaits_online_payment() { return Err(OrderError::NotAwaitingPayment.into()); }
    let intent = request_intent(gateway.as_ref(), &mut order).await?;
    orders::save_state(&mut tx, &order).await?;
    tx.commit().await?;
    info!(order_id = %order.id, gateway_order_id = %intent.gateway_order_id, "payment retry opened");
    Ok(Json(CheckoutResponse { order, payment: Some(intent) }))
}

// ---- admin ----

async fn admin_list_orders(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<OrderQuery>) -> Result<Json<Paginated<Order>>> {
    let page = Page { page: q.page, per_page: q.per_page };
    let data = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE ($1::order_status IS NULL OR status = $1) ORDER BY created_at DESC LIMIT $2 OFFSET $3")
        .bind(q.status).bind(page.limit()).bind(page.offset())
        .fetch_all(&s.db)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE ($1::order_status IS NULL OR status = $1)")
        .bind(q.status)
        .fetch_one(&s.db)
        .await?;
    Ok(Json(page.wrap(data, total)))
}

async fn admin_get_order(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    let mut conn = s.db.acquire().await?;
    Ok(Json(orders::find_order(&mut conn, id).await?))
}

/// Runs an admin decision against a locked order and applies what it settles.
async fn admin_apply<F>(s: &AppState, id: Uuid, decide: F) -> Result<Json<Order>>
where
    F: FnOnce(&mut Order) -> std::result::Result<crate::domain::aggregates::Settlement, OrderError>,
{
    let mut tx = s.db.begin().await?;
    let mut order = orders::lock_order(&mut tx, id).await?;
    let from = order.status;
    let settlement = decide(&mut order)?;
    orders::save_state(&mut tx, &order).await?;
    let mut events = order.take_events();
    events.extend(orders::settle(&mut tx, &order, &settlement).await?);
    tx.commit().await?;
    info!(order_id = %order.id, ?from, to = ?order.status, refund = ?settlement.refund, "order updated by admin");
    s.events.publish_all(events).await;
    Ok(Json(order))
}

#[instrument(skip(s, admin), fields(admin_id = %admin.0.id))]
async fn admin_update_status(State(s): State<AppState>, admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<StatusRequest>) -> Result<Json<Order>> {
    admin_apply(&s, id, |order| order.advance(r.status, Utc::now())).await
}

#[instrument(skip(s, admin), fields(admin_id = %admin.0.id))]
async fn admin_approve_return(State(s): State<AppState>, admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    admin_apply(&s, id, Order::approve_return).await
}

#[instrument(skip(s, admin), fields(admin_id = %admin.0.id))]
async fn admin_reject_return(State(s): State<AppState>, admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    admin_apply(&s, id, |order| order.reject_return().map(|_| Default::default())).await
}
