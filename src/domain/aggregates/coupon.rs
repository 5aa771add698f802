//! Coupon Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Percentage, PercentageError};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub discount_percentage: i32,
    pub max_discount: Decimal,
    pub min_purchase: Decimal,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub usage_limit: Option<i32>,
    pub used_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn normalize_code(code: &str) -> String { code.trim().to_uppercase() }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.starts_at <= now && now < self.ends_at && !self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool { self.usage_limit.is_some_and(|limit| self.used_count >= limit) }

    /// Discount this coupon gives on `subtotal`, or why it cannot be used.
    pub fn evaluate(&self, subtotal: Decimal, now: DateTime<Utc>, already_used: bool) -> Result<Decimal, CouponError> {
        if !self.is_active { return Err(CouponError::Inactive); }
        if now < self.starts_at { return Err(CouponError::NotStarted); }
        if now >= self.ends_at { return Err(CouponError::Expired); }
        if self.is_exhausted() { return Err(CouponError::UsageLimitReached); }
        if already_used { return Err(CouponError::AlreadyUsed); }
        if subtotal < self.min_purchase { return Err(CouponError::BelowMinimum { min: self.min_purchase }); }
        let pct = Percentage::coupon(self.discount_percentage).map_err(CouponError::Discount)?;
        Ok(pct.of(subtotal).round_dp(2).min(self.max_discount).min(subtotal))
    }
}

/// Field checks for a coupon definition before it is stored.
pub fn validate_coupon(
    code: &str, discount_percentage: i32, max_discount: Decimal, min_purchase: Decimal,
    starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, usage_limit: Option<i32>,
) -> Result<(), CouponError> {
    if code.trim().is_empty() || !code.trim().chars().all(|c| c.is_ascii_alphanumeric()) { return Err(CouponError::InvalidCode); }
    Percentage::coupon(discount_percentage).map_err(CouponError::Discount)?;
    if max_discount <= Decimal::ZERO || min_purchase < Decimal::ZERO { return Err(CouponError::InvalidAmount); }
    if ends_at <= starts_at { return Err(CouponError::InvalidWindow); }
    if usage_limit.is_some_and(|l| l < 1) { return Err(CouponError::InvalidAmount); }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponError {
    NotFound, Inactive, NotStarted, Expired, UsageLimitReached, AlreadyUsed,
    BelowMinimum { min: Decimal },
    Discount(PercentageError), InvalidCode, InvalidAmount, InvalidWindow,
}
impl std::error::Error for CouponError {}
impl std::fmt::Display for CouponError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "coupon not found"),
            Self::Inactive => write!(f, "coupon is not active"),
            Self::NotStarted => write!(f, "coupon is not valid yet"),
            Self::Expired => write!(f, "coupon has expired"),
            Self::UsageLimitReached => write!(f, "coupon usage limit reached"),
            Self::AlreadyUsed => write!(f, "coupon already used"),
            Self::BelowMinimum { min } => write!(f, "minimum purchase of {min} required for this coupon"),
            Self::Discount(e) => write!(f, "{e}"),
            Self::InvalidCode => write!(f, "coupon code must be alphanumeric"),
            Self::InvalidAmount => write!(f, "invalid coupon amount"),
            Self::InvalidWindow => write!(f, "coupon must end after it starts"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(now: DateTime<Utc>) -> Coupon {
        Coupon {
            id: Uuid::new_v4(), code: "SAVE10".into(), description: String::new(), discount_percentage: 10,
            max_discount: Decimal::new(200, 0), min_purchase: Decimal::new(500, 0),
            starts_at: now - Duration::days(1), ends_at: now + Duration::days(1),
            usage_limit: None, used_count: 0, is_active: true, created_at: now,
        }
    }

    #[test]
    fn test_below_minimum_rejected() {
        let now = Utc::now();
        let err = coupon(now).evaluate(Decimal::new(499, 0), now, false).unwrap_err();
        assert_eq!(err, CouponError::BelowMinimum { min: Decimal::new(500, 0) });
    }

    #[test]
    fn test_discount_is_percentage() {
        let now = Utc::now();
        assert_eq!(coupon(now).evaluate(Decimal::new(1000, 0), now, false).unwrap(), Decimal::new(100, 0));
    }

    #[test]
    fn test_discount_capped_at_max() {
        let now = Utc::now();
        assert_eq!(coupon(now).evaluate(Decimal::new(5000, 0), now, false).unwrap(), Decimal::new(200, 0));
    }

    #[test]
    fn test_full_discount_never_exceeds_subtotal() {
        let now = Utc::now();
        let mut c = coupon(now);
        c.discount_percentage = 100;
        c.max_discount = Decimal::new(10_000, 0);
        c.min_purchase = Decimal::ZERO;
        assert_eq!(c.evaluate(Decimal::new(750, 0), now, false).unwrap(), Decimal::new(750, 0));
    }

    #[test]
    fn test_window_and_state_checks() {
        let now = Utc::now();
        let subtotal = Decimal::new(1000, 0);
        let mut c = coupon(now);
        c.is_active = false;
        assert_eq!(c.evaluate(subtotal, now, false), Err(CouponError::Inactive));

        let mut c = coupon(now);
        c.starts_at = now + Duration::hours(1);
        assert_eq!(c.evaluate(subtotal, now, false), Err(CouponError::NotStarted));

        let mut c = coupon(now);
        c.ends_at = now;
        assert_eq!(c.evaluate(subtotal, now, false), Err(CouponError::Expired));

        let mut c = coupon(now);
        c.usage_limit = Some(3);
        c.used_count = 3;
        assert_eq!(c.evaluate(subtotal, now, false), Err(CouponError::UsageLimitReached));
        assert!(!c.is_live(now));

        assert_eq!(coupon(now).evaluate(subtotal, now, true), Err(CouponError::AlreadyUsed));
    }

    #[test]
    fn test_validate_coupon() {
        let now = Utc::now();
        let later = now + Duration::days(7);
        assert!(validate_coupon("WELCOME50", 50, Decimal::new(300, 0), Decimal::ZERO, now, later, Some(100)).is_ok());
        assert_eq!(validate_coupon("BAD CODE", 50, Decimal::ONE, Decimal::ZERO, now, later, None), Err(CouponError::InvalidCode));
        assert_eq!(validate_coupon("OK", 50, Decimal::ZERO, Decimal::ZERO, now, later, None), Err(CouponError::InvalidAmount));
        assert_eq!(validate_coupon("OK", 50, Decimal::ONE, Decimal::ZERO, later, now, None), Err(CouponError::InvalidWindow));
        assert!(matches!(validate_coupon("OK", 101, Decimal::ONE, Decimal::ZERO, now, later, None), Err(CouponError::Discount(_))));
    }
}
