use axum::{extract::{Query, State}, routing::get, Json, Router};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::api::extract::CurrentUser;
use crate::api::{Page, Paginated};
use crate::domain::aggregates::WalletEntry;
use crate::error::Result;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/wallet", get(get_wallet))
}

#[derive(Debug, Serialize)]
pub struct WalletView { pub balance: Decimal, pub currency: String, pub transactions: Paginated<WalletEntry> }

async fn get_wallet(State(s): State<AppState>, user: CurrentUser, Query(page): Query<Page>) -> Result<Json<WalletView>> {
    let balance: Decimal = sqlx::query_scalar("SELECT balance FROM wallets WHERE user_id = $1")
        .bind(user.id)
        .fetch_optional(&s.db)
        .await?
        .unwrap_or(Decimal::ZERO);
    let data = sqlx::query_as::<_, WalletEntry>("SELECT * FROM wallet_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3")
        .bind(user.id).bind(page.limit()).bind(page.offset())
        .fetch_all(&s.db)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wallet_transactions WHERE user_id = $1").bind(user.id).fetch_one(&s.db).await?;
    Ok(Json(WalletView { balance, currency: s.config.currency.clone(), transactions: page.wrap(data, total) }))
}
