use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::{Coupon, CouponError};
use crate::error::Result;

pub async fn find_by_code(conn: &mut PgConnection, code: &str) -> Result<Coupon> {
    Ok(sqlx::query_as::<_, Coupon>("SELECT * FROM coupons WHERE code = $1")
        .bind(Coupon::normalize_code(code))
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(CouponError::NotFound)?)
}

pub async fn already_used(conn: &mut PgConnection, coupon_id: Uuid, user_id: Uuid) -> Result<bool> {
    Ok(sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM coupon_redemptions WHERE coupon_id = $1 AND user_id = $2)")
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?)
}

/// Looks up `code` and works out its discount on `subtotal`. Guests are never
/// treated as having used a coupon; the check repeats at checkout once signed in.
pub async fn evaluate(conn: &mut PgConnection, code: &str, user_id: Option<Uuid>, subtotal: Decimal, now: DateTime<Utc>) -> Result<(Coupon, Decimal)> {
    let coupon = find_by_code(conn, code).await?;
    let used = match user_id {
        Some(user_id) => already_used(conn, coupon.id, user_id).await?,
        None => false,
    };
    let discount = coupon.evaluate(subtotal, now, used)?;
    Ok((coupon, discount))
}

/// Records a redemption and bumps the usage counter. The conditional update
/// keeps concurrent checkouts from running past the usage limit.
pub async fn redeem(conn: &mut PgConnection, coupon_id: Uuid, user_id: Uuid, order_id: Uuid) -> Result<()> {
    let bumped = sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)")
        .bind(coupon_id)
        .execute(&mut *conn)
        .await?;
    if bumped.rows_affected() == 0 { return Err(CouponError::UsageLimitReached.into()); }
    let inserted = sqlx::query("INSERT INTO coupon_redemptions (coupon_id, user_id, order_id, created_at) VALUES ($1, $2, $3, NOW()) ON CONFLICT DO NOTHING")
        .bind(coupon_id)
        .bind(user_id)
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    if inserted.rows_affected() == 0 { return Err(CouponError::AlreadyUsed.into()); }
    Ok(())
}
