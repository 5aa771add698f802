//! Request extractors for the three kinds of caller: signed-in shopper,
//! admin, and guest identified only by `X-Session-Id`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use uuid::Uuid;

use crate::auth::decode_token;
use crate::domain::aggregates::AccountError;
use crate::error::ShopError;
use crate::store::cart::CartOwner;
use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

/// A signed-in, unblocked user. Blocking takes effect on the next request, not at token expiry.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser { pub id: Uuid, pub is_admin: bool }

#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub CurrentUser);

/// Guest session id from `X-Session-Id`, if the client sent one.
#[derive(Debug, Clone)]
pub struct GuestSession(pub Option<String>);

/// Whoever owns the cart for this request: the bearer token's user, else the guest session.
#[derive(Debug, Clone)]
pub struct Shopper(pub CartOwner);

fn bearer(parts: &Parts) -> Option<&str> {
    parts.headers.get(AUTHORIZATION)?.to_str().ok()?.strip_prefix("Bearer ").map(str::trim)
}

fn session_id(parts: &Parts) -> Option<String> {
    parts.headers.get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(ShopError::Unauthorized)?;
        let claims = decode_token(&state.config.jwt_secret, token)?;
        let (is_blocked, is_admin): (bool, bool) = sqlx::query_as("SELECT is_blocked, is_admin FROM users WHERE id = $1")
            .bind(claims.sub)
            .fetch_optional(&state.db)
            .await?
            .ok_or(ShopError::Unauthorized)?;
        if is_blocked { return Err(AccountError::Blocked.into()); }
        Ok(Self { id: claims.sub, is_admin })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin { return Err(ShopError::Forbidden("Admin access required".into())); }
        Ok(Self(user))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for GuestSession {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(session_id(parts)))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Shopper {
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if bearer(parts).is_some() {
            let user = CurrentUser::from_request_parts(parts, state).await?;
            return Ok(Self(CartOwner::User(user.id)));
        }
        session_id(parts)
            .map(|s| Self(CartOwner::Guest(s)))
            .ok_or_else(|| ShopError::BadRequest("Sign in or send an X-Session-Id header".into()))
    }
}
