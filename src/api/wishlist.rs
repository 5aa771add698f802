use axum::{extract::{Path, State}, http::StatusCode, routing::{delete, get, post}, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::cart::{add_to_cart, view};
use crate::api::extract::CurrentUser;
use crate::domain::aggregates::PricedLine;
use crate::error::{Result, ShopError};
use crate::store::cart::{CartOwner, CartView};
use crate::store::{catalog, offers};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wishlist", get(list).post(add))
        .route("/wishlist/:product_id", delete(remove))
        .route("/wishlist/:product_id/move-to-cart", post(move_to_cart))
}

#[derive(Debug, Deserialize)] pub struct WishlistRequest { pub product_id: Uuid }

async fn list(State(s): State<AppState>, user: CurrentUser) -> Result<Json<Vec<PricedLine>>> {
    let mut conn = s.db.acquire().await?;
    let ids: Vec<Uuid> = sqlx::query_scalar("SELECT product_id FROM wishlist_items WHERE user_id = $1 ORDER BY created_at DESC")
        .bind(user.id)
        .fetch_all(&mut *conn)
        .await?;
    let rows = catalog::find_products(&mut conn, &ids).await?;
    let book = offers::load_offer_book(&mut conn).await?;
    let now = Utc::now();
    let lines = ids.iter()
        .filter_map(|id| rows.iter().find(|r| r.product.id == *id && r.is_visible()))
        .map(|r| r.line(1, &book, &s.config.currency, now))
        .collect();
    Ok(Json(lines))
}

async fn add(State(s): State<AppState>, user: CurrentUser, Json(r): Json<WishlistRequest>) -> Result<StatusCode> {
    let mut conn = s.db.acquire().await?;
    catalog::find_product(&mut conn, r.product_id).await?
        .filter(|row| row.is_visible())
        .ok_or(ShopError::NotFound("Product"))?;
    sqlx::query("INSERT INTO wishlist_items (user_id, product_id, created_at) VALUES ($1, $2, NOW()) ON CONFLICT DO NOTHING")
        .bind(user.id).bind(r.product_id)
        .execute(&mut *conn)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn remove(State(s): State<AppState>, user: CurrentUser, Path(product_id): Path<Uuid>) -> Result<StatusCode> {
    let removed = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
        .bind(user.id).bind(product_id)
        .execute(&s.db)
        .await?;
    if removed.rows_affected() == 0 { return Err(ShopError::NotFound("Wishlist item")); }
    Ok(StatusCode::NO_CONTENT)
}

/// Puts one unit in the cart and drops the product from the wishlist; the
/// wishlist entry stays when the cart rejects the product.
async fn move_to_cart(State(s): State<AppState>, user: CurrentUser, Path(product_id): Path<Uuid>) -> Result<Json<CartView>> {
    let owner = CartOwner::User(user.id);
    let listed: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM wishlist_items WHERE user_id = $1 AND product_id = $2)")
        .bind(user.id).bind(product_id)
        .fetch_one(&s.db)
        .await?;
    if !listed { return Err(ShopError::NotFound("Wishlist item")); }
    let cart = add_to_cart(&s, &owner, product_id, 1).await?;
    sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
        .bind(user.id).bind(product_id)
        .execute(&s.db)
        .await?;
    view(&s, &owner, &cart).await
}
