//! Customer Aggregate

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip)]
    pub password_hash: String,
    pub referral_code: String,
    pub is_verified: bool,
    pub is_blocked: bool,
    pub is_admin: bool,
    #[serde(skip)]
    pub otp_code: Option<String>,
    #[serde(skip)]
    pub otp_expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub reset_token: Option<String>,
    #[serde(skip)]
    pub reset_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A one-time secret with an expiry, used for OTPs and reset tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OneTimeCode { pub code: String, pub expires_at: DateTime<Utc> }

impl OneTimeCode {
    pub fn otp(now: DateTime<Utc>, ttl_secs: i64) -> Self {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        Self { code, expires_at: now + Duration::seconds(ttl_secs) }
    }

    pub fn reset_token(now: DateTime<Utc>, ttl_secs: i64) -> Self {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        Self { code: hex::encode(bytes), expires_at: now + Duration::seconds(ttl_secs) }
    }
}

fn check_code(stored: Option<&str>, expires_at: Option<DateTime<Utc>>, given: &str, now: DateTime<Utc>) -> Result<(), AccountError> {
    match (stored, expires_at) {
        (Some(code), Some(exp)) if bool::from(code.as_bytes().ct_eq(given.trim().as_bytes())) => {
            if now >= exp { Err(AccountError::CodeExpired) } else { Ok(()) }
        }
        _ => Err(AccountError::InvalidCode),
    }
}

impl User {
    pub fn ensure_can_login(&self) -> Result<(), AccountError> {
        if self.is_blocked { return Err(AccountError::Blocked); }
        if !self.is_verified { return Err(AccountError::Unverified); }
        Ok(())
    }

    pub fn check_otp(&self, otp: &str, now: DateTime<Utc>) -> Result<(), AccountError> {
        if self.is_verified { return Err(AccountError::AlreadyVerified); }
        check_code(self.otp_code.as_deref(), self.otp_expires_at, otp, now)
    }

    pub fn check_reset_token(&self, token: &str, now: DateTime<Utc>) -> Result<(), AccountError> {
        check_code(self.reset_token.as_deref(), self.reset_expires_at, token, now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountError { Blocked, Unverified, AlreadyVerified, InvalidCode, CodeExpired, SelfBlock }
impl std::error::Error for AccountError {}
impl std::fmt::Display for AccountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blocked => write!(f, "Account is blocked"),
            Self::Unverified => write!(f, "Email address is not verified"),
            Self::AlreadyVerified => write!(f, "Account is already verified"),
            Self::InvalidCode => write!(f, "Invalid code"),
            Self::CodeExpired => write!(f, "Code has expired"),
            Self::SelfBlock => write!(f, "Admins cannot block themselves"),
        }
    }
}
