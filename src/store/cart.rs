//! Cart persistence and pricing. Signed-in shoppers own a cart by user id,
//! guests by the `X-Session-Id` they send.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartItem, CartTotals, LineLimit, PricedLine};
use crate::error::{Result, ShopError};
use crate::store::catalog::{self, CatalogRow};
use crate::store::{coupons, offers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartOwner {
    User(Uuid),
    Guest(String),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<Uuid> {
        match self { Self::User(id) => Some(*id), Self::Guest(_) => None }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub items: Vec<PricedLine>,
    /// Lines whose product is unlisted or sold out; checkout refuses while any remain.
    pub unavailable: Vec<Uuid>,
    #[serde(flatten)]
    pub totals: CartTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_error: Option<String>,
}

pub fn line_limit(row: &CatalogRow, max_per_item: i32) -> LineLimit {
    LineLimit { max_per_item, stock: row.product.stock }
}

pub async fn find_cart(conn: &mut PgConnection, owner: &CartOwner) -> Result<Option<Cart>> {
    let head: Option<(Uuid, Option<String>)> = match owner {
        CartOwner::User(user_id) => sqlx::query_as("SELECT id, coupon_code FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?,
        CartOwner::Guest(session) => sqlx::query_as("SELECT id, coupon_code FROM carts WHERE session_id = $1")
            .bind(session)
            .fetch_optional(&mut *conn)
            .await?,
    };
    let Some((id, coupon_code)) = head else { return Ok(None) };
    let items = sqlx::query_as::<_, CartItem>("SELECT product_id, quantity FROM cart_items WHERE cart_id = $1 ORDER BY created_at")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(Some(Cart::restore(id, items, coupon_code)))
}

pub async fn get_or_create(conn: &mut PgConnection, owner: &CartOwner) -> Result<Cart> {
    if let Some(cart) = find_cart(conn, owner).await? { return Ok(cart); }
    let id = Uuid::now_v7();
    match owner {
        CartOwner::User(user_id) => sqlx::query("INSERT INTO carts (id, user_id, created_at, updated_at) VALUES ($1, $2, NOW(), NOW()) ON CONFLICT (user_id) DO NOTHING")
            .bind(id)
            .bind(user_id)
            .execute(&mut *conn)
            .await?,
        CartOwner::Guest(session) => sqlx::query("INSERT INTO carts (id, session_id, created_at, updated_at) VALUES ($1, $2, NOW(), NOW()) ON CONFLICT (session_id) DO NOTHING")
            .bind(id)
            .bind(session)
            .execute(&mut *conn)
            .await?,
    };
    find_cart(conn, owner).await?.ok_or_else(|| ShopError::Internal("cart insert lost".into()))
}

/// Writes the cart lines and coupon back, dropping lines no longer present.
pub async fn save(conn: &mut PgConnection, cart: &Cart) -> Result<()> {
    let ids: Vec<Uuid> = cart.items().iter().map(|i| i.product_id).collect();
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND NOT (product_id = ANY($2))")
        .bind(cart.id())
        .bind(&ids)
        .execute(&mut *conn)
        .await?;
    for item in cart.items() {
        sqlx::query("INSERT INTO cart_items (cart_id, product_id, quantity, created_at) VALUES ($1, $2, $3, NOW()) ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity")
            .bind(cart.id())
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
    }
    sqlx::query("UPDATE carts SET coupon_code = $2, updated_at = NOW() WHERE id = $1")
        .bind(cart.id())
        .bind(cart.coupon_code())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn delete(conn: &mut PgConnection, cart_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM carts WHERE id = $1").bind(cart_id).execute(&mut *conn).await?;
    Ok(())
}

/// Lines checkout would accept; unavailable ones are left out of the totals.
fn purchasable(items: &[PricedLine], unavailable: &[Uuid]) -> Vec<PricedLine> {
    items.iter().filter(|l| !unavailable.contains(&l.product_id)).cloned().collect()
}

/// Prices every line at today's best offer and re-checks the stored coupon.
/// A coupon that no longer applies is reported in `coupon_error` rather than failing the view.
pub async fn price(conn: &mut PgConnection, cart: &Cart, user_id: Option<Uuid>, currency: &str, now: DateTime<Utc>) -> Result<CartView> {
    let ids: Vec<Uuid> = cart.items().iter().map(|i| i.product_id).collect();
    let rows = catalog::find_products(conn, &ids).await?;
    let book = offers::load_offer_book(conn).await?;

    let mut items = Vec::with_capacity(rows.len());
    let mut unavailable = Vec::new();
    for item in cart.items() {
        let Some(row) = rows.iter().find(|r| r.product.id == item.product_id) else { continue };
        if !row.is_visible() || row.product.stock < item.quantity { unavailable.push(item.product_id); }
        items.push(row.line(item.quantity, &book, currency, now));
    }

    let buyable = purchasable(&items, &unavailable);
    let subtotal: Decimal = buyable.iter().map(|l| l.line_total.amount()).sum();
    let mut coupon_error = None;
    let coupon = match cart.coupon_code() {
        Some(code) => match coupons::evaluate(conn, code, user_id, subtotal, now).await {
            Ok((coupon, discount)) => Some((coupon.code, discount)),
            Err(ShopError::Coupon(e)) => { coupon_error = Some(e.to_string()); None }
            Err(e) => return Err(e),
        },
        None => None,
    };
    let totals = CartTotals::compute(&buyable, coupon);
    Ok(CartView { id: cart.id(), items, unavailable, totals, coupon_error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;

    fn line(price: i64, quantity: i32) -> PricedLine {
        let each = Money::inr(Decimal::new(price, 0));
        PricedLine {
            product_id: Uuid::new_v4(), name: "Mug".into(), image: None, quantity, stock: 10,
            unit_price: each.clone(), sale_price: each, line_total: Money::inr(Decimal::new(price * i64::from(quantity), 0)), offer: None,
        }
    }

    #[test]
    fn test_unavailable_lines_leave_totals() {
        let (kept, sold_out) = (line(300, 1), line(900, 2));
        let items = vec![kept.clone(), sold_out.clone()];
        let buyable = purchasable(&items, &[sold_out.product_id]);
        assert_eq!(buyable.len(), 1);
        assert_eq!(buyable[0].product_id, kept.product_id);
        assert_eq!(CartTotals::compute(&buyable, None).subtotal, Decimal::new(300, 0));
    }
}
