use axum::{extract::{Path, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::CurrentUser;
use crate::error::{Result, ShopError};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/addresses", get(list).post(create))
        .route("/addresses/:id", put(update).delete(remove))
        .route("/addresses/:id/default", post(make_default))
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Address {
    /// Copy stored on an order, so later edits do not rewrite order history.
    pub fn snapshot(&self) -> Value {
        json!({
            "full_name": self.full_name, "phone": self.phone,
            "line1": self.line1, "line2": self.line2,
            "city": self.city, "state": self.state,
            "postal_code": self.postal_code, "country": self.country,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1, max = 100))] pub full_name: String,
    #[validate(length(min = 7, max = 20))] pub phone: String,
    #[validate(length(min = 1, max = 200))] pub line1: String,
    #[validate(length(max = 200))] pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))] pub city: String,
    #[validate(length(min = 1, max = 100))] pub state: String,
    #[validate(length(min = 3, max = 12))] pub postal_code: String,
    #[validate(length(min = 2, max = 60))] pub country: String,
}

async fn list(State(s): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Address>>> {
    let rows = sqlx::query_as::<_, Address>("SELECT * FROM addresses WHERE user_id = $1 ORDER BY is_default DESC, created_at")
        .bind(user.id)
        .fetch_all(&s.db)
        .await?;
    Ok(Json(rows))
}

async fn create(State(s): State<AppState>, user: CurrentUser, Json(r): Json<AddressRequest>) -> Result<(StatusCode, Json<Address>)> {
    r.validate()?;
    let a = sqlx::query_as::<_, Address>(
        "INSERT INTO addresses (id, user_id, full_name, phone, line1, line2, city, state, postal_code, country, is_default, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOT EXISTS (SELECT 1 FROM addresses WHERE user_id = $2), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7()).bind(user.id).bind(&r.full_name).bind(&r.phone).bind(&r.line1).bind(&r.line2)
    .bind(&r.city).bind(&r.state).bind(&r.postal_code).bind(&r.country)
    .fetch_one(&s.db)
    .await?;
    Ok((StatusCode::CREATED, Json(a)))
}

async fn update(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>, Json(r): Json<AddressRequest>) -> Result<Json<Address>> {
    r.validate()?;
    sqlx::query_as::<_, Address>(
        "UPDATE addresses SET full_name = $3, phone = $4, line1 = $5, line2 = $6, city = $7, state = $8, postal_code = $9, country = $10 \
         WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(id).bind(user.id).bind(&r.full_name).bind(&r.phone).bind(&r.line1).bind(&r.line2)
    .bind(&r.city).bind(&r.state).bind(&r.postal_code).bind(&r.country)
    .fetch_optional(&s.db)
    .await?
    .map(Json)
    .ok_or(ShopError::NotFound("Address"))
}

/// Deleting the default address promotes the oldest remaining one.
async fn remove(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let mut tx = s.db.begin().await?;
    let was_default: bool = sqlx::query_scalar("DELETE FROM addresses WHERE id = $1 AND user_id = $2 RETURNING is_default")
        .bind(id).bind(user.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ShopError::NotFound("Address"))?;
    if was_default {
        sqlx::query("UPDATE addresses SET is_default = TRUE WHERE id = (SELECT id FROM addresses WHERE user_id = $1 ORDER BY created_at LIMIT 1)")
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn make_default(State(s): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<Address>> {
    let mut tx = s.db.begin().await?;
    sqlx::query("UPDATE addresses SET is_default = FALSE WHERE user_id = $1 AND id <> $2")
        .bind(user.id).bind(id)
        .execute(&mut *tx)
        .await?;
    let a = sqlx::query_as::<_, Address>("UPDATE addresses SET is_default = TRUE WHERE id = $1 AND user_id = $2 RETURNING *")
        .bind(id).bind(user.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ShopError::NotFound("Address"))?;
    tx.commit().await?;
    Ok(Json(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_omits_ids() {
        let a = Address {
            id: Uuid::now_v7(), user_id: Uuid::now_v7(), full_name: "Asha Rao".into(), phone: "9876543210".into(),
            line1: "12 MG Road".into(), line2: None, city: "Bengaluru".into(), state: "KA".into(),
            postal_code: "560001".into(), country: "IN".into(), is_default: true, created_at: Utc::now(),
        };
        let snap = a.snapshot();
        assert_eq!(snap["city"], "Bengaluru");
        assert!(snap.get("id").is_none());
        assert!(snap.get("user_id").is_none());
    }
}
