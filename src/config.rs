use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::error::{Result, ShopError};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub nats_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expires_secs: i64,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,
    pub currency: String,
    pub cod_limit: Decimal,
    pub max_qty_per_item: i32,
    pub return_window_days: i64,
    pub otp_ttl_secs: i64,
    pub reset_ttl_secs: i64,
}

/// Reads `name`, falling back to `default` when unset; a set but unparsable value is an error.
fn parsed<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ShopError::Config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|e| ShopError::Config(format!("Missing environment variable 'DATABASE_URL': {e}")))?;
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set, using development secret");
            "development-secret-change-me".into()
        });

        let config = Self {
            port: parsed("PORT", 8083)?,
            database_url,
            nats_url: optional("NATS_URL"),
            jwt_secret,
            jwt_expires_secs: parsed("JWT_EXPIRES_SECS", 60 * 60 * 24)?,
            razorpay_key_id: optional("RAZORPAY_KEY_ID"),
            razorpay_key_secret: optional("RAZORPAY_KEY_SECRET"),
            currency: optional("CURRENCY").unwrap_or_else(|| "INR".into()),
            cod_limit: parsed("COD_LIMIT", Decimal::new(1000, 0))?,
            max_qty_per_item: parsed("MAX_QTY_PER_ITEM", 10)?,
            return_window_days: parsed("RETURN_WINDOW_DAYS", 7)?,
            otp_ttl_secs: parsed("OTP_TTL_SECS", 300)?,
            reset_ttl_secs: parsed("RESET_TTL_SECS", 900)?,
        };
        if config.max_qty_per_item < 1 {
            return Err(ShopError::Config("MAX_QTY_PER_ITEM must be at least 1".into()));
        }
        tracing::info!(port = config.port, currency = %config.currency, razorpay = config.razorpay_key_id.is_some(), "configuration loaded");
        Ok(config)
    }

    /// Defaults used by tests and local tooling.
    pub fn for_tests(database_url: &str) -> Self {
        Self {
            port: 0,
            database_url: database_url.into(),
            nats_url: None,
            jwt_secret: "test-secret".into(),
            jwt_expires_secs: 3600,
            razorpay_key_id: None,
            razorpay_key_secret: None,
            currency: "INR".into(),
            cod_limit: Decimal::new(1000, 0),
            max_qty_per_item: 10,
            return_window_days: 7,
            otp_ttl_secs: 300,
            reset_ttl_secs: 900,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_defaults_and_errors() {
        assert_eq!(parsed::<i64>("SHOPFRONT_TEST_UNSET_VAR", 7).unwrap(), 7);
        env::set_var("SHOPFRONT_TEST_BAD_INT", "seven");
        assert!(matches!(parsed::<i64>("SHOPFRONT_TEST_BAD_INT", 7), Err(ShopError::Config(_))));
        env::set_var("SHOPFRONT_TEST_DECIMAL", " 1500.50 ");
        assert_eq!(parsed("SHOPFRONT_TEST_DECIMAL", Decimal::ZERO).unwrap(), Decimal::new(150050, 2));
    }

    #[test]
    fn test_optional_ignores_blank() {
        env::set_var("SHOPFRONT_TEST_BLANK", "  ");
        assert_eq!(optional("SHOPFRONT_TEST_BLANK"), None);
    }
}
