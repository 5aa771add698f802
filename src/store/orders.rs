use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderItem, Settlement};
use crate::domain::events::DomainEvent;
use crate::error::{Result, ShopError};
use crate::store::wallet;

pub async fn find_order(conn: &mut PgConnection, id: Uuid) -> Result<Order> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ShopError::NotFound("Order"))?;
    let items = order_items(conn, id).await?;
    Ok(order.with_items(items))
}

/// Same as [`find_order`] but holds a row lock until the transaction ends.
pub async fn lock_order(conn: &mut PgConnection, id: Uuid) -> Result<Order> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(ShopError::NotFound("Order"))?;
    let items = order_items(conn, id).await?;
    Ok(order.with_items(items))
}

pub async fn order_items(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<OrderItem>> {
    Ok(sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY name")
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?)
}

pub async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        "INSERT INTO orders (id, order_number, user_id, status, payment_method, payment_status, subtotal, coupon_code, coupon_discount, total, currency, shipping_address, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(order.id).bind(&order.order_number).bind(order.user_id).bind(order.status)
    .bind(order.payment_method).bind(order.payment_status).bind(order.subtotal).bind(&order.coupon_code)
    .bind(order.coupon_discount).bind(order.total).bind(&order.currency).bind(&order.shipping_address)
    .bind(order.created_at).bind(order.updated_at)
    .execute(&mut *conn)
    .await?;
    for item in &order.items {
        sqlx::query("INSERT INTO order_items (id, order_id, product_id, name, unit_price, sale_price, quantity, line_total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(item.id).bind(item.order_id).bind(item.product_id).bind(&item.name)
            .bind(item.unit_price).bind(item.sale_price).bind(item.quantity).bind(item.line_total)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Persists the mutable part of an order after a state change.
pub async fn save_state(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        "UPDATE orders SET status = $2, payment_status = $3, gateway_order_id = $4, gateway_payment_id = $5, \
         return_reason = $6, delivered_at = $7, updated_at = $8 WHERE id = $1",
    )
    .bind(order.id).bind(order.status).bind(order.payment_status).bind(&order.gateway_order_id)
    .bind(&order.gateway_payment_id).bind(&order.return_reason).bind(order.delivered_at).bind(order.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Takes ordered quantities off the shelf. Fails when any product no longer has enough stock.
pub async fn take_stock(conn: &mut PgConnection, order: &Order) -> Result<()> {
    for item in &order.items {
        let taken = sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1 AND stock >= $2")
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
        if taken.rows_affected() == 0 {
            return Err(ShopError::Conflict(format!("{} is out of stock", item.name)));
        }
    }
    Ok(())
}

pub async fn restock(conn: &mut PgConnection, order: &Order) -> Result<()> {
    for item in &order.items {
        sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Carries out what a cancellation or return owes: stock back on the shelf
/// and, for paid orders, a wallet refund. Returns the wallet events raised.
pub async fn settle(conn: &mut PgConnection, order: &Order, settlement: &Settlement) -> Result<Vec<DomainEvent>> {
    if settlement.restock { restock(conn, order).await?; }
    let Some(amount) = settlement.refund else { return Ok(vec![]) };
    wallet::open_wallet(conn, order.user_id).await?;
    let description = format!("Refund for order {}", order.order_number);
    let (_, events) = wallet::credit(conn, order.user_id, amount, &description, Some(order.id)).await?;
    Ok(events)
}
