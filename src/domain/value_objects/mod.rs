//! Value Objects for the storefront

use rand::{distributions::Uniform, Rng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Referral code handed out to every customer at registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferralCode(String);

impl ReferralCode {
    pub const LEN: usize = 8;
    const ALPHABET: &'static [u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    pub fn new(value: impl Into<String>) -> Result<Self, ReferralCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(ReferralCodeError::Empty); }
        if value.len() != Self::LEN || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ReferralCodeError::Malformed);
        }
        Ok(Self(value))
    }

    pub fn generate() -> Self {
        let dist = Uniform::from(0..Self::ALPHABET.len());
        let code = rand::thread_rng()
            .sample_iter(dist)
            .take(Self::LEN)
            .map(|i| Self::ALPHABET[i] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ReferralCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone)] pub enum ReferralCodeError { Empty, Malformed }
impl std::error::Error for ReferralCodeError {}
impl fmt::Display for ReferralCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "referral code empty"), Self::Malformed => write!(f, "referral code malformed") }
    }
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_string() } }
    pub fn inr(amount: Decimal) -> Self { Self::new(amount, "INR") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn is_zero(&self) -> bool { self.amount.is_zero() }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn subtract(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount - other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }
    /// Price after taking `pct` off, rounded to paise.
    pub fn percent_off(&self, pct: Percentage) -> Money {
        Money::new((self.amount - pct.of(self.amount)).round_dp(2), &self.currency)
    }
    pub fn min(self, other: Money) -> Money { if other.amount < self.amount { other } else { self } }
    /// Amount in the currency's minor unit, as payment gateways expect it.
    pub fn minor_units(&self) -> i64 {
        (self.amount * Decimal::ONE_HUNDRED).round().to_i64().unwrap_or(i64::MAX)
    }
}

impl Default for Money { fn default() -> Self { Self::zero("INR") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {:.2}", self.currency, self.amount) }
}

#[derive(Debug, Clone)] pub enum MoneyError { CurrencyMismatch }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Currency mismatch") }
}

/// Whole-number discount percentage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Percentage(u8);

impl Percentage {
    pub const MAX_OFFER: u8 = 90;
    pub const MAX_COUPON: u8 = 100;

    pub fn new(value: i32, max: u8) -> Result<Self, PercentageError> {
        if value < 1 || value > i32::from(max) { return Err(PercentageError::OutOfRange { max }); }
        Ok(Self(value as u8))
    }
    pub fn offer(value: i32) -> Result<Self, PercentageError> { Self::new(value, Self::MAX_OFFER) }
    pub fn coupon(value: i32) -> Result<Self, PercentageError> { Self::new(value, Self::MAX_COUPON) }
    pub fn value(&self) -> u8 { self.0 }
    pub fn of(&self, amount: Decimal) -> Decimal { amount * Decimal::from(self.0) / Decimal::ONE_HUNDRED }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PercentageError { OutOfRange { max: u8 } }
impl std::error::Error for PercentageError {}
impl fmt::Display for PercentageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::OutOfRange { max } => write!(f, "percentage must be between 1 and {max}") }
    }
}

/// Quantity value object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: u32) -> Self { Self(value) }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: u32) -> Self { Self(self.0.saturating_add(other)) }
    pub fn subtract(&self, other: u32) -> Option<Self> {
        if other > self.0 { None } else { Some(Self(self.0 - other)) }
    }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
}
