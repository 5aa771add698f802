//! HTTP surface. Shop routes sit under `/api/v1`, back-office routes under `/api/v1/admin`.

pub mod accounts;
pub mod addresses;
pub mod admin;
pub mod cart;
pub mod catalog;
pub mod coupons;
pub mod extract;
pub mod offers;
pub mod orders;
pub mod wallet;
pub mod wishlist;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::ValidationError;

use crate::AppState;

pub fn router() -> Router<AppState> {
    let admin = Router::new()
        .merge(admin::routes())
        .merge(catalog::admin_routes())
        .merge(offers::admin_routes())
        .merge(coupons::admin_routes())
        .merge(orders::admin_routes());

    let shop = Router::new()
        .merge(accounts::routes())
        .merge(catalog::routes())
        .merge(cart::routes())
        .merge(coupons::routes())
        .merge(wishlist::routes())
        .merge(addresses::routes())
        .merge(orders::routes())
        .merge(wallet::routes())
        .nest("/admin", admin);

    Router::new().route("/health", get(health)).nest("/api/v1", shop)
}

async fn health(State(s): State<AppState>) -> (StatusCode, Json<Value>) {
    match sqlx::query("SELECT 1").execute(&s.db).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "healthy", "service": "shopfront"}))),
        Err(e) => {
            tracing::warn!(error = %e, "health check could not reach the database");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "degraded", "service": "shopfront"})))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Page { pub page: Option<u32>, pub per_page: Option<u32> }

impl Page {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn number(&self) -> u32 { self.page.unwrap_or(1).max(1) }
    pub fn size(&self) -> u32 { self.per_page.unwrap_or(Self::DEFAULT_PER_PAGE).clamp(1, Self::MAX_PER_PAGE) }
    pub fn limit(&self) -> i64 { i64::from(self.size()) }
    pub fn offset(&self) -> i64 { i64::from(self.number() - 1) * self.limit() }

    pub fn wrap<T>(&self, data: Vec<T>, total: i64) -> Paginated<T> {
        Paginated { data, total, page: self.number(), per_page: self.size() }
    }
}

#[derive(Debug, Serialize)]
pub struct Paginated<T> { pub data: Vec<T>, pub total: i64, pub page: u32, pub per_page: u32 }

/// `%term%` for ILIKE, or `None` when the search box is empty.
pub fn like_pattern(search: Option<&str>) -> Option<String> {
    search.map(str::trim).filter(|s| !s.is_empty()).map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")))
}

/// Validator for money fields: at most two decimals and within `NUMERIC(12,2)`.
pub fn money(value: &Decimal) -> Result<(), ValidationError> {
    if value.normalize().scale() > 2 { return Err(ValidationError::new("too_many_decimals")); }
    if value.abs() > Decimal::new(999_999_999_999, 2) { return Err(ValidationError::new("too_large")); }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_precision() {
        assert!(money(&Decimal::new(1050, 2)).is_ok());
        assert!(money(&Decimal::new(10500, 3)).is_ok());
        assert_eq!(money(&Decimal::new(1, 3)).unwrap_err().code, "too_many_decimals");
        assert_eq!(money(&Decimal::new(1_000_000_000_000, 2)).unwrap_err().code, "too_large");
    }

    #[test]
    fn test_page_bounds() {
        let p = Page::default();
        assert_eq!((p.number(), p.size(), p.offset()), (1, 20, 0));
        let p = Page { page: Some(3), per_page: Some(500) };
        assert_eq!((p.number(), p.size(), p.offset()), (3, 100, 200));
        let p = Page { page: Some(0), per_page: Some(0) };
        assert_eq!((p.number(), p.size()), (1, 1));
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern(Some("  ")), None);
        assert_eq!(like_pattern(Some("red shoe")).as_deref(), Some("%red shoe%"));
        assert_eq!(like_pattern(Some("50%")).as_deref(), Some("%50\\%%"));
    }
}
