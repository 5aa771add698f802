use axum::{extract::{Path, State}, routing::{get, post, put}, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::{CurrentUser, Shopper};
use crate::domain::aggregates::{Cart, CartError, ProductError};
use crate::error::{Result, ShopError};
use crate::store::cart::{self as cart_store, line_limit, CartOwner, CartView};
use crate::store::{catalog, coupons};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route("/cart/items/:product_id", put(set_quantity).delete(remove_item))
        .route("/cart/coupon", post(apply_coupon).delete(remove_coupon))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest { pub product_id: Uuid, #[validate(range(min = 1, max = 1000))] pub quantity: Option<i32> }
#[derive(Debug, Deserialize, Validate)]
pub struct QuantityRequest { #[validate(range(min = 0, max = 1000))] pub quantity: i32 }
#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest { #[validate(length(min = 1, max = 32))] pub code: String }

pub(crate) async fn view(s: &AppState, owner: &CartOwner, cart: &Cart) -> Result<Json<CartView>> {
    let mut conn = s.db.acquire().await?;
    Ok(Json(cart_store::price(&mut conn, cart, owner.user_id(), &s.config.currency, Utc::now()).await?))
}

/// Adds `quantity` of a purchasable product to the owner's cart, merging with any existing line.
pub(crate) async fn add_to_cart(s: &AppState, owner: &CartOwner, product_id: Uuid, quantity: i32) -> Result<Cart> {
    let mut tx = s.db.begin().await?;
    let row = catalog::find_product(&mut tx, product_id).await?.ok_or(ShopError::NotFound("Product"))?;
    if !row.is_visible() { return Err(ProductError::Unavailable.into()); }
    let mut cart = cart_store::get_or_create(&mut tx, owner).await?;
    cart.add_item(product_id, quantity, line_limit(&row, s.config.max_qty_per_item))?;
    cart_store::save(&mut tx, &cart).await?;
    tx.commit().await?;
    Ok(cart)
}

async fn get_cart(State(s): State<AppState>, Shopper(owner): Shopper) -> Result<Json<CartView>> {
    let mut conn = s.db.acquire().await?;
    let cart = cart_store::find_cart(&mut conn, &owner).await?.unwrap_or_default();
    drop(conn);
    view(&s, &owner, &cart).await
}

async fn add_item(State(s): State<AppState>, Shopper(owner): Shopper, Json(r): Json<AddItemRequest>) -> Result<Json<CartView>> {
    r.validate()?;
    let cart = add_to_cart(&s, &owner, r.product_id, r.quantity.unwrap_or(1)).await?;
    view(&s, &owner, &cart).await
}

async fn set_quantity(State(s): State<AppState>, Shopper(owner): Shopper, Path(product_id): Path<Uuid>, Json(r): Json<QuantityRequest>) -> Result<Json<CartView>> {
    r.validate()?;
    let mut tx = s.db.begin().await?;
    let mut cart = cart_store::find_cart(&mut tx, &owner).await?.ok_or(CartError::ItemNotFound)?;
    let row = catalog::find_product(&mut tx, product_id).await?.ok_or(CartError::ItemNotFound)?;
    cart.update_quantity(product_id, r.quantity, line_limit(&row, s.config.max_qty_per_item))?;
    cart_store::save(&mut tx, &cart).await?;
    tx.commit().await?;
    view(&s, &owner, &cart).await
}

async fn remove_item(State(s): State<AppState>, Shopper(owner): Shopper, Path(product_id): Path<Uuid>) -> Result<Json<CartView>> {
    let mut tx = s.db.begin().await?;
    let mut cart = cart_store::find_cart(&mut tx, &owner).await?.ok_or(CartError::ItemNotFound)?;
    cart.remove_item(product_id)?;
    cart_store::save(&mut tx, &cart).await?;
    tx.commit().await?;
    view(&s, &owner, &cart).await
}

async fn clear_cart(State(s): State<AppState>, Shopper(owner): Shopper) -> Result<Json<CartView>> {
    let mut tx = s.db.begin().await?;
    let mut cart = cart_store::get_or_create(&mut tx, &owner).await?;
    cart.clear();
    cart_store::save(&mut tx, &cart).await?;
    tx.commit().await?;
    view(&s, &owner, &cart).await
}

/// Coupons are bound to a customer account, so only signed-in carts take one.
async fn apply_coupon(State(s): State<AppState>, user: CurrentUser, Json(r): Json<CouponRequest>) -> Result<Json<CartView>> {
    r.validate()?;
    let owner = CartOwner::User(user.id);
    let mut tx = s.db.begin().await?;
    let mut cart = cart_store::find_cart(&mut tx, &owner).await?.filter(|c| !c.is_empty()).ok_or(CartError::Empty)?;
    let priced = cart_store::price(&mut tx, &cart, Some(user.id), &s.config.currency, Utc::now()).await?;
    let (coupon, discount) = coupons::evaluate(&mut tx, &r.code, Some(user.id), priced.totals.subtotal, Utc::now()).await?;
    cart.apply_coupon(coupon.code.clone());
    cart_store::save(&mut tx, &cart).await?;
    tx.commit().await?;
    tracing::info!(user_id = %user.id, code = %coupon.code, %discount, "coupon applied");
    view(&s, &owner, &cart).await
}

async fn remove_coupon(State(s): State<AppState>, user: CurrentUser) -> Result<Json<CartView>> {
    let owner = CartOwner::User(user.id);
    let mut tx = s.db.begin().await?;
    let mut cart = cart_store::get_or_create(&mut tx, &owner).await?;
    cart.remove_coupon();
    cart_store::save(&mut tx, &cart).await?;
    tx.commit().await?;
    view(&s, &owner, &cart).await
}
