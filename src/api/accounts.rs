use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::{CurrentUser, GuestSession};
use crate::auth::{hash_password, issue_token, verify_password};
use crate::domain::aggregates::offer::current_referral_offer;
use crate::domain::aggregates::{AccountError, OneTimeCode, ReferralOffer, User};
use crate::domain::events::{CustomerEvent, DomainEvent};
use crate::domain::value_objects::ReferralCode;
use crate::error::{Result, ShopError};
use crate::services::Email;
use crate::store::cart::{self as cart_store, line_limit, CartOwner};
use crate::store::{catalog, offers, wallet};
use crate::AppState;

const REFERRAL_CODE_ATTEMPTS: usize = 5;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-otp", post(verify_otp))
        .route("/auth/resend-otp", post(resend_otp))
        .route("/auth/login", post(login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/me", get(me).put(update_me))
        .route("/referral", get(referral))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 7, max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate)] pub struct VerifyOtpRequest { #[validate(email)] pub email: String, #[validate(length(equal = 6))] pub otp: String }
#[derive(Debug, Deserialize, Validate)] pub struct EmailRequest { #[validate(email)] pub email: String }
#[derive(Debug, Deserialize, Validate)] pub struct LoginRequest { #[validate(email)] pub email: String, #[validate(length(min = 1))] pub password: String }
#[derive(Debug, Deserialize, Validate)] pub struct ResetPasswordRequest { #[validate(length(min = 1))] pub token: String, #[validate(length(min = 8, max = 128))] pub password: String }
#[derive(Debug, Deserialize, Validate)] pub struct UpdateProfileRequest { #[validate(length(min = 1, max = 100))] pub name: String, #[validate(length(min = 7, max = 20))] pub phone: Option<String> }

#[derive(Debug, Serialize)] pub struct TokenResponse { pub token: String, pub token_type: &'static str, pub expires_in: i64, pub user: User }
#[derive(Debug, Serialize)] pub struct ReferralSummary { pub referral_code: String, pub referrals: i64, pub offer: Option<ReferralOffer> }

fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

async fn find_by_email(conn: &mut PgConnection, email: &str) -> Result<Option<User>> {
    Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(normalize_email(email))
        .fetch_optional(&mut *conn)
        .await?)
}

async fn unused_referral_code(conn: &mut PgConnection) -> Result<ReferralCode> {
    for _ in 0..REFERRAL_CODE_ATTEMPTS {
        let code = ReferralCode::generate();
        let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE referral_code = $1)")
            .bind(code.as_str())
            .fetch_one(&mut *conn)
            .await?;
        if !taken { return Ok(code); }
    }
    Err(ShopError::Internal("could not allocate a unique referral code".into()))
}

/// Pays out the live referral offer, if any, to both sides of a referral.
async fn reward_referral(conn: &mut PgConnection, referrer_id: Uuid, referee: &User) -> Result<Vec<DomainEvent>> {
    let live = offers::live_referral_offers(conn).await?;
    let offer = current_referral_offer(&live, Utc::now());
    let (referrer_reward, referee_reward) = offer.map_or((Decimal::ZERO, Decimal::ZERO), |o| (o.referrer_reward, o.referee_reward));
    sqlx::query("INSERT INTO referrals (id, referrer_id, referee_id, referrer_reward, referee_reward, created_at) VALUES ($1, $2, $3, $4, $5, NOW())")
        .bind(Uuid::now_v7()).bind(referrer_id).bind(referee.id).bind(referrer_reward).bind(referee_reward)
        .execute(&mut *conn)
        .await?;
    let mut events = Vec::new();
    if referrer_reward > Decimal::ZERO {
        let description = format!("Referral reward for inviting {}", referee.name);
        events.extend(wallet::credit(conn, referrer_id, referrer_reward, &description, None).await?.1);
    }
    if referee_reward > Decimal::ZERO {
        events.extend(wallet::credit(conn, referee.id, referee_reward, "Welcome reward for joining with a referral code", None).await?.1);
    }
    Ok(events)
}

#[instrument(skip(s, r), fields(email = %r.email))]
async fn register(State(s): State<AppState>, Json(r): Json<RegisterRequest>) -> Result<(StatusCode, Json<Value>)> {
    r.validate()?;
    let email = normalize_email(&r.email);
    let mut tx = s.db.begin().await?;
    if find_by_email(&mut tx, &email).await?.is_some() {
        return Err(ShopError::Conflict("Email is already registered".into()));
    }
    let referrer_id: Option<Uuid> = match r.referral_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => {
            let code = ReferralCode::new(raw).map_err(|_| ShopError::BadRequest("Unknown referral code".into()))?;
            let found: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE referral_code = $1")
                .bind(code.as_str())
                .fetch_optional(&mut *tx)
                .await?;
            Some(found.ok_or_else(|| ShopError::BadRequest("Unknown referral code".into()))?)
        }
        None => None,
    };

    let password_hash = hash_password(&r.password)?;
    let code = unused_referral_code(&mut tx).await?;
    let otp = OneTimeCode::otp(Utc::now(), s.config.otp_ttl_secs);
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, name, email, phone, password_hash, referral_code, is_verified, is_blocked, is_admin, otp_code, otp_expires_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE, FALSE, $7, $8, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7()).bind(r.name.trim()).bind(&email).bind(&r.phone).bind(&password_hash)
    .bind(code.as_str()).bind(&otp.code).bind(otp.expires_at)
    .fetch_one(&mut *tx)
    .await?;
    wallet::open_wallet(&mut tx, user.id).await?;

    let mut events = vec![DomainEvent::Customer(CustomerEvent::Registered { user_id: user.id, referred_by: referrer_id })];
    if let Some(referrer_id) = referrer_id {
        events.extend(reward_referral(&mut tx, referrer_id, &user).await?);
    }
    tx.commit().await?;

    if let Err(e) = s.mailer.send(Email::otp(&user.email, &otp.code, s.config.otp_ttl_secs)).await {
        warn!(error = %e, "verification email not sent");
    }
    s.events.publish_all(events).await;
    info!(user_id = %user.id, "user registered");
    Ok((StatusCode::CREATED, Json(json!({"user": user, "message": "Verification code sent"}))))
}

async fn verify_otp(State(s): State<AppState>, Json(r): Json<VerifyOtpRequest>) -> Result<Json<User>> {
    r.validate()?;
    let mut conn = s.db.acquire().await?;
    let user = find_by_email(&mut conn, &r.email).await?.ok_or(ShopError::NotFound("User"))?;
    user.check_otp(&r.otp, Utc::now())?;
    let user = sqlx::query_as::<_, User>("UPDATE users SET is_verified = TRUE, otp_code = NULL, otp_expires_at = NULL, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(user.id)
        .fetch_one(&mut *conn)
        .await?;
    s.events.publish_all(vec![DomainEvent::Customer(CustomerEvent::Verified { user_id: user.id })]).await;
    Ok(Json(user))
}

async fn resend_otp(State(s): State<AppState>, Json(r): Json<EmailRequest>) -> Result<StatusCode> {
    r.validate()?;
    let mut conn = s.db.acquire().await?;
    let user = find_by_email(&mut conn, &r.email).await?.ok_or(ShopError::NotFound("User"))?;
    if user.is_verified { return Err(AccountError::AlreadyVerified.into()); }
    let otp = OneTimeCode::otp(Utc::now(), s.config.otp_ttl_secs);
    sqlx::query("UPDATE users SET otp_code = $2, otp_expires_at = $3, updated_at = NOW() WHERE id = $1")
        .bind(user.id).bind(&otp.code).bind(otp.expires_at)
        .execute(&mut *conn)
        .await?;
    s.mailer.send(Email::otp(&user.email, &otp.code, s.config.otp_ttl_secs)).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Folds the guest cart for `session` into the user's cart and drops the guest cart.
async fn merge_guest_cart(conn: &mut PgConnection, user_id: Uuid, session: String, max_per_item: i32) -> Result<()> {
    let Some(guest) = cart_store::find_cart(conn, &CartOwner::Guest(session)).await? else { return Ok(()) };
    let mut cart = cart_store::get_or_create(conn, &CartOwner::User(user_id)).await?;
    let ids: Vec<Uuid> = guest.items().iter().map(|i| i.product_id).collect();
    let rows = catalog::find_products(conn, &ids).await?;
    cart.merge(&guest, |product_id| {
        rows.iter().find(|r| r.product.id == product_id && r.is_visible()).map(|r| line_limit(r, max_per_item))
    });
    cart_store::save(conn, &cart).await?;
    cart_store::delete(conn, guest.id()).await?;
    info!(%user_id, merged = guest.item_count(), "guest cart merged");
    Ok(())
}

#[instrument(skip(s, guest, r), fields(email = %r.email))]
async fn login(State(s): State<AppState>, GuestSession(guest): GuestSession, Json(r): Json<LoginRequest>) -> Result<Json<TokenResponse>> {
    r.validate()?;
    let mut tx = s.db.begin().await?;
    let user = find_by_email(&mut tx, &r.email).await?
        .filter(|u| verify_password(&r.password, &u.password_hash))
        .ok_or(ShopError::Unauthorized)?;
    user.ensure_can_login()?;
    if let Some(session) = guest {
        merge_guest_cart(&mut tx, user.id, session, s.config.max_qty_per_item).await?;
    }
    tx.commit().await?;
    let token = issue_token(&s.config.jwt_secret, s.config.jwt_expires_secs, user.id, user.is_admin)?;
    Ok(Json(TokenResponse { token, token_type: "Bearer", expires_in: s.config.jwt_expires_secs, user }))
}

async fn forgot_password(State(s): State<AppState>, Json(r): Json<EmailRequest>) -> Result<StatusCode> {
    r.validate()?;
    let mut conn = s.db.acquire().await?;
    if let Some(user) = find_by_email(&mut conn, &r.email).await? {
        let token = OneTimeCode::reset_token(Utc::now(), s.config.reset_ttl_secs);
        sqlx::query("UPDATE users SET reset_token = $2, reset_expires_at = $3, updated_at = NOW() WHERE id = $1")
            .bind(user.id).bind(&token.code).bind(token.expires_at)
            .execute(&mut *conn)
            .await?;
        if let Err(e) = s.mailer.send(Email::password_reset(&user.email, &token.code, s.config.reset_ttl_secs)).await {
            warn!(error = %e, "password reset email not sent");
        }
    }
    Ok(StatusCode::ACCEPTED)
}

async fn reset_password(State(s): State<AppState>, Json(r): Json<ResetPasswordRequest>) -> Result<StatusCode> {
    r.validate()?;
    let mut conn = s.db.acquire().await?;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE reset_token = $1")
        .bind(r.token.trim())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(AccountError::InvalidCode)?;
    user.check_reset_token(&r.token, Utc::now())?;
    let password_hash = hash_password(&r.password)?;
    sqlx::query("UPDATE users SET password_hash = $2, reset_token = NULL, reset_expires_at = NULL, updated_at = NOW() WHERE id = $1")
        .bind(user.id).bind(&password_hash)
        .execute(&mut *conn)
        .await?;
    info!(user_id = %user.id, "password reset");
    Ok(StatusCode::NO_CONTENT)
}

async fn me(State(s): State<AppState>, user: CurrentUser) -> Result<Json<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound("User"))
}

async fn update_me(State(s): State<AppState>, user: CurrentUser, Json(r): Json<UpdateProfileRequest>) -> Result<Json<User>> {
    r.validate()?;
    let updated = sqlx::query_as::<_, User>("UPDATE users SET name = $2, phone = $3, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(user.id).bind(r.name.trim()).bind(&r.phone)
        .fetch_one(&s.db)
        .await?;
    Ok(Json(updated))
}

async fn referral(State(s): State<AppState>, user: CurrentUser) -> Result<Json<ReferralSummary>> {
    let mut conn = s.db.acquire().await?;
    let referral_code: String = sqlx::query_scalar("SELECT referral_code FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&mut *conn)
        .await?;
    let referrals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM referrals WHERE referrer_id = $1")
        .bind(user.id)
        .fetch_one(&mut *conn)
        .await?;
    let live = offers::live_referral_offers(&mut conn).await?;
    let offer = current_referral_offer(&live, Utc::now()).cloned();
    Ok(Json(ReferralSummary { referral_code, referrals, offer }))
}
