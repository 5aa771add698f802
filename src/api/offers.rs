//! Admin management of product, category, default and referral offers.
//! A product or category keeps at most one active offer; activating one retires the rest.

use axum::{extract::{Path, State}, http::StatusCode, routing::{get, put}, Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{postgres::PgRow, FromRow, PgConnection};
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::AdminUser;
use crate::domain::aggregates::offer::{validate_offer, validate_window};
use crate::domain::aggregates::{CategoryOffer, DefaultOffer, OfferError, ProductOffer, ReferralOffer};
use crate::error::{Result, ShopError};
use crate::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/offers/products", get(list_product_offers).post(create_product_offer))
        .route("/offers/products/:id", put(update_product_offer).delete(delete_product_offer))
        .route("/offers/categories", get(list_category_offers).post(create_category_offer))
        .route("/offers/categories/:id", put(update_category_offer).delete(delete_category_offer))
        .route("/offers/default", get(list_default_offers).post(create_default_offer))
        .route("/offers/default/:id", put(update_default_offer).delete(delete_default_offer))
        .route("/offers/referral", get(list_referral_offers).post(create_referral_offer))
        .route("/offers/referral/:id", put(update_referral_offer).delete(delete_referral_offer))
}

const ONE_ACTIVE: &str = "Another offer for this target was activated concurrently";

fn active_by_default() -> bool { true }

#[derive(Debug, Deserialize)]
pub struct TargetedOfferRequest { pub target_id: Uuid, pub discount_percentage: i32, pub starts_at: DateTime<Utc>, pub ends_at: DateTime<Utc> }

#[derive(Debug, Deserialize)]
pub struct OfferUpdate {
    pub name: Option<String>,
    pub discount_percentage: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct DefaultOfferRequest { pub name: String, pub discount_percentage: i32, pub starts_at: DateTime<Utc>, pub ends_at: DateTime<Utc> }

#[derive(Debug, Deserialize, Validate)]
pub struct ReferralOfferRequest {
    #[validate(custom = "crate::api::money")]
    pub referrer_reward: Decimal,
    #[validate(custom = "crate::api::money")]
    pub referee_reward: Decimal,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
}

impl ReferralOfferRequest {
    fn check(&self) -> Result<()> {
        self.validate()?;
        if self.referrer_reward < Decimal::ZERO || self.referee_reward < Decimal::ZERO { return Err(OfferError::NegativeReward.into()); }
        validate_window(self.starts_at, self.ends_at)?;
        Ok(())
    }
}

/// Tables holding offers scoped to one row of another table.
#[derive(Debug, Clone, Copy)]
enum Targeted { Product, Category }

impl Targeted {
    fn table(self) -> &'static str { match self { Self::Product => "product_offers", Self::Category => "category_offers" } }
    fn column(self) -> &'static str { match self { Self::Product => "product_id", Self::Category => "category_id" } }
    fn target_table(self) -> &'static str { match self { Self::Product => "products", Self::Category => "categories" } }
    fn missing(self) -> ShopError { match self { Self::Product => ShopError::NotFound("Product"), Self::Category => ShopError::NotFound("Category") } }
}

async fn list_all<T>(s: &AppState, table: &str) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    Ok(sqlx::query_as::<_, T>(&format!("SELECT * FROM {table} ORDER BY created_at DESC")).fetch_all(&s.db).await?)
}

async fn delete_from(s: &AppState, table: &str, id: Uuid, what: &'static str) -> Result<StatusCode> {
    let gone = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1")).bind(id).execute(&s.db).await?;
    if gone.rows_affected() == 0 { return Err(ShopError::NotFound(what)); }
    Ok(StatusCode::NO_CONTENT)
}

async fn retire_others(conn: &mut PgConnection, kind: Targeted, target_id: Uuid, keep: Uuid) -> Result<()> {
    let retired = sqlx::query(&format!("UPDATE {} SET is_active = FALSE WHERE {} = $1 AND id <> $2 AND is_active", kind.table(), kind.column()))
        .bind(target_id).bind(keep)
        .execute(&mut *conn)
        .await?;
    if retired.rows_affected() > 0 {
        tracing::info!(table = kind.table(), %target_id, retired = retired.rows_affected(), "older offers deactivated");
    }
    Ok(())
}

async fn create_targeted<T>(s: &AppState, kind: Targeted, r: TargetedOfferRequest) -> Result<(StatusCode, Json<T>)>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    validate_offer(r.discount_percentage, r.starts_at, r.ends_at)?;
    let mut tx = s.db.begin().await?;
    let exists: bool = sqlx::query_scalar(&format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", kind.target_table()))
        .bind(r.target_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists { return Err(kind.missing()); }
    let id = Uuid::now_v7();
    retire_others(&mut tx, kind, r.target_id, id).await?;
    let offer = sqlx::query_as::<_, T>(&format!(
        "INSERT INTO {} (id, {}, discount_percentage, starts_at, ends_at, is_active, created_at) VALUES ($1, $2, $3, $4, $5, TRUE, NOW()) RETURNING *",
        kind.table(), kind.column()
    ))
    .bind(id).bind(r.target_id).bind(r.discount_percentage).bind(r.starts_at).bind(r.ends_at)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ShopError::unique_conflict(e, ONE_ACTIVE))?;
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

async fn update_targeted<T>(s: &AppState, kind: Targeted, id: Uuid, r: OfferUpdate) -> Result<Json<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    validate_offer(r.discount_percentage, r.starts_at, r.ends_at)?;
    let mut tx = s.db.begin().await?;
    let target_id: Uuid = sqlx::query_scalar(&format!("SELECT {} FROM {} WHERE id = $1", kind.column(), kind.table()))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ShopError::NotFound("Offer"))?;
    if r.is_active { retire_others(&mut tx, kind, target_id, id).await?; }
    let offer = sqlx::query_as::<_, T>(&format!(
        "UPDATE {} SET discount_percentage = $2, starts_at = $3, ends_at = $4, is_active = $5 WHERE id = $1 RETURNING *",
        kind.table()
    ))
    .bind(id).bind(r.discount_percentage).bind(r.starts_at).bind(r.ends_at).bind(r.is_active)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ShopError::unique_conflict(e, ONE_ACTIVE))?;
    tx.commit().await?;
    Ok(Json(offer))
}

async fn list_product_offers(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<ProductOffer>>> { Ok(Json(list_all(&s, "product_offers").await?)) }
async fn create_product_offer(State(s): State<AppState>, _admin: AdminUser, Json(r): Json<TargetedOfferRequest>) -> Result<(StatusCode, Json<ProductOffer>)> { create_targeted(&s, Targeted::Product, r).await }
async fn update_product_offer(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<OfferUpdate>) -> Result<Json<ProductOffer>> { update_targeted(&s, Targeted::Product, id, r).await }
async fn delete_product_offer(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> { delete_from(&s, "product_offers", id, "Offer").await }

async fn list_category_offers(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<CategoryOffer>>> { Ok(Json(list_all(&s, "category_offers").await?)) }
async fn create_category_offer(State(s): State<AppState>, _admin: AdminUser, Json(r): Json<TargetedOfferRequest>) -> Result<(StatusCode, Json<CategoryOffer>)> { create_targeted(&s, Targeted::Category, r).await }
async fn update_category_offer(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<OfferUpdate>) -> Result<Json<CategoryOffer>> { update_targeted(&s, Targeted::Category, id, r).await }
async fn delete_category_offer(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> { delete_from(&s, "category_offers", id, "Offer").await }

async fn list_default_offers(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<DefaultOffer>>> { Ok(Json(list_all(&s, "default_offers").await?)) }

async fn create_default_offer(State(s): State<AppState>, _admin: AdminUser, Json(r): Json<DefaultOfferRequest>) -> Result<(StatusCode, Json<DefaultOffer>)> {
    validate_offer(r.discount_percentage, r.starts_at, r.ends_at)?;
    if r.name.trim().is_empty() { return Err(ShopError::BadRequest("Offer name is required".into())); }
    let offer = sqlx::query_as::<_, DefaultOffer>("INSERT INTO default_offers (id, name, discount_percentage, starts_at, ends_at, is_active, created_at) VALUES ($1, $2, $3, $4, $5, TRUE, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(r.name.trim()).bind(r.discount_percentage).bind(r.starts_at).bind(r.ends_at)
        .fetch_one(&s.db)
        .await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

async fn update_default_offer(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<OfferUpdate>) -> Result<Json<DefaultOffer>> {
    validate_offer(r.discount_percentage, r.starts_at, r.ends_at)?;
    sqlx::query_as::<_, DefaultOffer>("UPDATE default_offers SET name = COALESCE($2, name), discount_percentage = $3, starts_at = $4, ends_at = $5, is_active = $6 WHERE id = $1 RETURNING *")
        .bind(id).bind(r.name.as_deref().map(str::trim)).bind(r.discount_percentage).bind(r.starts_at).bind(r.ends_at).bind(r.is_active)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound("Offer"))
}

async fn delete_default_offer(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> { delete_from(&s, "default_offers", id, "Offer").await }

async fn list_referral_offers(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<ReferralOffer>>> { Ok(Json(list_all(&s, "referral_offers").await?)) }

async fn create_referral_offer(State(s): State<AppState>, _admin: AdminUser, Json(r): Json<ReferralOfferRequest>) -> Result<(StatusCode, Json<ReferralOffer>)> {
    r.check()?;
    let offer = sqlx::query_as::<_, ReferralOffer>("INSERT INTO referral_offers (id, referrer_reward, referee_reward, starts_at, ends_at, is_active, created_at) VALUES ($1, $2, $3, $4, $5, $6, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(r.referrer_reward).bind(r.referee_reward).bind(r.starts_at).bind(r.ends_at).bind(r.is_active)
        .fetch_one(&s.db)
        .await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

async fn update_referral_offer(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<ReferralOfferRequest>) -> Result<Json<ReferralOffer>> {
    r.check()?;
    sqlx::query_as::<_, ReferralOffer>("UPDATE referral_offers SET referrer_reward = $2, referee_reward = $3, starts_at = $4, ends_at = $5, is_active = $6 WHERE id = $1 RETURNING *")
        .bind(id).bind(r.referrer_reward).bind(r.referee_reward).bind(r.starts_at).bind(r.ends_at).bind(r.is_active)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound("Offer"))
}

async fn delete_referral_offer(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> { delete_from(&s, "referral_offers", id, "Offer").await }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_request_checks() {
        let now = Utc::now();
        let mut r = ReferralOfferRequest { referrer_reward: Decimal::new(100, 0), referee_reward: Decimal::new(50, 0), starts_at: now, ends_at: now + chrono::Duration::days(30), is_active: true };
        assert!(r.check().is_ok());
        r.referee_reward = Decimal::new(-1, 0);
        assert!(matches!(r.check(), Err(ShopError::Offer(OfferError::NegativeReward))));
        r.referee_reward = Decimal::new(5005, 3);
        assert!(matches!(r.check(), Err(ShopError::Validation(_))));
    }

    #[test]
    fn test_targeted_tables() {
        assert_eq!((Targeted::Product.table(), Targeted::Product.column()), ("product_offers", "product_id"));
        assert_eq!((Targeted::Category.table(), Targeted::Category.column()), ("category_offers", "category_id"));
    }
}
