//! Back-office: customer accounts and sales reports.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::extract::AdminUser;
use crate::api::{like_pattern, Page, Paginated};
use crate::domain::aggregates::{AccountError, OrderStatus, User};
use crate::domain::events::{CustomerEvent, DomainEvent};
use crate::domain::report::{ReportPeriod, SalesReport, SalesRow};
use crate::error::{Result, ShopError};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/block", post(block_user))
        .route("/users/:id/unblock", post(unblock_user))
        .route("/reports/sales", get(sales_report))
        .route("/reports/sales.csv", get(sales_report_csv))
}

#[derive(Debug, Deserialize)] pub struct UserQuery { pub search: Option<String>, pub page: Option<u32>, pub per_page: Option<u32> }
#[derive(Debug, Deserialize)] pub struct ReportQuery { pub period: ReportPeriod, pub from: Option<NaiveDate>, pub to: Option<NaiveDate> }

async fn list_users(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<UserQuery>) -> Result<Json<Paginated<User>>> {
    let page = Page { page: q.page, per_page: q.per_page };
    let pattern = like_pattern(q.search.as_deref());
    let data = sqlx::query_as::<_, User>("SELECT * FROM users WHERE ($1::text IS NULL OR email ILIKE $1 OR name ILIKE $1) ORDER BY created_at DESC LIMIT $2 OFFSET $3")
        .bind(&pattern).bind(page.limit()).bind(page.offset())
        .fetch_all(&s.db)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE ($1::text IS NULL OR email ILIKE $1 OR name ILIKE $1)")
        .bind(&pattern)
        .fetch_one(&s.db)
        .await?;
    Ok(Json(page.wrap(data, total)))
}

async fn set_blocked(s: &AppState, admin: AdminUser, id: Uuid, blocked: bool) -> Result<Json<User>> {
    if blocked && admin.0.id == id { return Err(AccountError::SelfBlock.into()); }
    let user = sqlx::query_as::<_, User>("UPDATE users SET is_blocked = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(blocked)
        .fetch_optional(&s.db)
        .await?
        .ok_or(ShopError::NotFound("User"))?;
    info!(admin_id = %admin.0.id, user_id = %id, blocked, "user access changed");
    let event = if blocked { CustomerEvent::Blocked { user_id: id } } else { CustomerEvent::Unblocked { user_id: id } };
    s.events.publish_all(vec![DomainEvent::Customer(event)]).await;
    Ok(Json(user))
}

async fn block_user(State(s): State<AppState>, admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<User>> { set_blocked(&s, admin, id, true).await }
async fn unblock_user(State(s): State<AppState>, admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<User>> { set_blocked(&s, admin, id, false).await }

async fn build_report(s: &AppState, q: &ReportQuery) -> Result<SalesReport> {
    let (from, to) = q.period.range(Utc::now(), q.from, q.to)?;
    use OrderStatus::*;
    let statuses: Vec<OrderStatus> = [PaymentPending, Placed, Shipped, Delivered, Cancelled, ReturnRequested, Returned, PaymentFailed]
        .into_iter()
        .filter(|st| st.is_sale())
        .collect();
    let rows = sqlx::query_as::<_, SalesRow>(
        "SELECT o.id AS order_id, o.created_at AS order_created_at, o.total AS order_total, o.coupon_discount, \
                i.product_id, i.name AS product_name, COALESCE(c.name, 'Uncategorised') AS category_name, \
                i.quantity, i.unit_price, i.line_total \
         FROM orders o \
         JOIN order_items i ON i.order_id = o.id \
         LEFT JOIN products p ON p.id = i.product_id \
         LEFT JOIN categories c ON c.id = p.category_id \
         WHERE o.created_at >= $1 AND o.created_at < $2 AND o.status = ANY($3) \
         ORDER BY o.created_at",
    )
    .bind(from).bind(to).bind(&statuses)
    .fetch_all(&s.db)
    .await?;
    Ok(SalesReport::aggregate(from, to, &rows))
}

async fn sales_report(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<ReportQuery>) -> Result<Json<SalesReport>> {
    Ok(Json(build_report(&s, &q).await?))
}

async fn sales_report_csv(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<ReportQuery>) -> Result<impl IntoResponse> {
    let report = build_report(&s, &q).await?;
    let body = report.to_csv().map_err(|e| ShopError::Internal(e.to_string()))?;
    let filename = format!("attachment; filename=\"sales-{}-{}.csv\"", report.from.date_naive(), report.to.date_naive());
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()), (header::CONTENT_DISPOSITION, filename)], body))
}
