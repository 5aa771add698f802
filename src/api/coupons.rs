use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::{AdminUser, CurrentUser};
use crate::api::{Page, Paginated};
use crate::domain::aggregates::coupon::validate_coupon;
use crate::domain::aggregates::Coupon;
use crate::error::{Result, ShopError};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/coupons", get(available_coupons))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/coupons", get(admin_list).post(create))
        .route("/coupons/:id", put(update).delete(remove))
        .route("/coupons/:id/activate", post(activate))
        .route("/coupons/:id/deactivate", post(deactivate))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CouponRequest {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub description: String,
    #[validate(range(min = 1, max = 100))]
    pub discount_percentage: i32,
    #[validate(custom = "crate::api::money")]
    pub max_discount: Decimal,
    #[serde(default)]
    #[validate(custom = "crate::api::money")]
    pub min_purchase: Decimal,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
}

impl CouponRequest {
    fn check(&self) -> Result<()> {
        self.validate()?;
        validate_coupon(&self.code, self.discount_percentage, self.max_discount, self.min_purchase, self.starts_at, self.ends_at, self.usage_limit)?;
        Ok(())
    }
}

/// Live coupons the caller has not redeemed yet.
async fn available_coupons(State(s): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Coupon>>> {
    let rows = sqlx::query_as::<_, Coupon>(
        "SELECT c.* FROM coupons c WHERE c.is_active AND c.starts_at <= NOW() AND c.ends_at > NOW() \
         AND (c.usage_limit IS NULL OR c.used_count < c.usage_limit) \
         AND NOT EXISTS (SELECT 1 FROM coupon_redemptions r WHERE r.coupon_id = c.id AND r.user_id = $1) \
         ORDER BY c.ends_at",
    )
    .bind(user.id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(rows))
}

async fn admin_list(State(s): State<AppState>, _admin: AdminUser, Query(page): Query<Page>) -> Result<Json<Paginated<Coupon>>> {
    let data = sqlx::query_as::<_, Coupon>("SELECT * FROM coupons ORDER BY created_at DESC LIMIT $1 OFFSET $2")
        .bind(page.limit()).bind(page.offset())
        .fetch_all(&s.db)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coupons").fetch_one(&s.db).await?;
    Ok(Json(page.wrap(data, total)))
}

async fn ensure_code_free(s: &AppState, code: &str, except: Option<Uuid>) -> Result<()> {
    let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM coupons WHERE code = $1 AND ($2::uuid IS NULL OR id <> $2))")
        .bind(code).bind(except)
        .fetch_one(&s.db)
        .await?;
    if taken { return Err(ShopError::Conflict(format!("Coupon code {code} already exists"))); }
    Ok(())
}

async fn create(State(s): State<AppState>, _admin: AdminUser, Json(r): Json<CouponRequest>) -> Result<(StatusCode, Json<Coupon>)> {
    r.check()?;
    let code = Coupon::normalize_code(&r.code);
    ensure_code_free(&s, &code, None).await?;
    let c = sqlx::query_as::<_, Coupon>(
        "INSERT INTO coupons (id, code, description, discount_percentage, max_discount, min_purchase, starts_at, ends_at, usage_limit, used_count, is_active, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, TRUE, NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7()).bind(&code).bind(&r.description).bind(r.discount_percentage).bind(r.max_discount)
    .bind(r.min_purchase).bind(r.starts_at).bind(r.ends_at).bind(r.usage_limit)
    .fetch_one(&s.db)
    .await?;
    tracing::info!(code = %c.code, "coupon created");
    Ok((StatusCode::CREATED, Json(c)))
}

async fn update(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<CouponRequest>) -> Result<Json<Coupon>> {
    r.check()?;
    let code = Coupon::normalize_code(&r.code);
    ensure_code_free(&s, &code, Some(id)).await?;
    sqlx::query_as::<_, Coupon>(
        "UPDATE coupons SET code = $2, description = $3, discount_percentage = $4, max_discount = $5, min_purchase = $6, \
         starts_at = $7, ends_at = $8, usage_limit = $9 WHERE id = $1 RETURNING *",
    )
    .bind(id).bind(&code).bind(&r.description).bind(r.discount_percentage).bind(r.max_discount)
    .bind(r.min_purchase).bind(r.starts_at).bind(r.ends_at).bind(r.usage_limit)
    .fetch_optional(&s.db)
    .await?
    .map(Json)
    .ok_or(ShopError::NotFound("Coupon"))
}

/// Redeemed coupons stay for the order history; deactivate those instead.
async fn remove(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let used: Option<i32> = sqlx::query_scalar("SELECT used_count FROM coupons WHERE id = $1").bind(id).fetch_optional(&s.db).await?;
    match used {
        None => Err(ShopError::NotFound("Coupon")),
        Some(n) if n > 0 => Err(ShopError::Conflict("Coupon has been redeemed; deactivate it instead".into())),
        Some(_) => {
            sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(&s.db).await?;
            Ok(StatusCode::NO_CONTENT)
        }
    }
}

async fn set_active(s: &AppState, id: Uuid, active: bool) -> Result<Json<Coupon>> {
    sqlx::query_as::<_, Coupon>("UPDATE coupons SET is_active = $2 WHERE id = $1 RETURNING *")
        .bind(id).bind(active)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound("Coupon"))
}

async fn activate(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Coupon>> { set_active(&s, id, true).await }
async fn deactivate(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Coupon>> { set_active(&s, id, false).await }
