use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::domain::aggregates::{AccountError, CartError, CouponError, OfferError, OrderError, ProductError, WalletError};
use crate::domain::report::ReportError;

#[derive(Error, Debug)]
pub enum ShopError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Account(#[from] AccountError),

    #[error("{0}")]
    Product(#[from] ProductError),

    #[error("{0}")]
    Offer(#[from] OfferError),

    #[error("{0}")]
    Coupon(#[from] CouponError),

    #[error("{0}")]
    Cart(#[from] CartError),

    #[error("{0}")]
    Order(#[from] OrderError),

    #[error("{0}")]
    Wallet(#[from] WalletError),

    #[error("{0}")]
    Report(#[from] ReportError),

    #[error("online payments are not configured")]
    PaymentUnavailable,

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = ShopError> = std::result::Result<T, E>;

impl ShopError {
    /// Reports a unique-constraint violation as a 409 carrying `message`; other errors pass through.
    pub fn unique_conflict(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() { return Self::Conflict(message.to_string()); }
        }
        Self::Database(e)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) | Self::Coupon(CouponError::NotFound) | Self::Wallet(WalletError::NotFound) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::Offer(_) | Self::Coupon(_) | Self::Report(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) | Self::Order(_) => StatusCode::CONFLICT,
            Self::Account(AccountError::Blocked | AccountError::Unverified | AccountError::SelfBlock) => StatusCode::FORBIDDEN,
            Self::Account(_) => StatusCode::BAD_REQUEST,
            Self::Product(ProductError::Unavailable) => StatusCode::NOT_FOUND,
            Self::Product(ProductError::InsufficientInventory { .. }) | Self::Cart(CartError::OutOfStock | CartError::InsufficientStock { .. }) => StatusCode::CONFLICT,
            Self::Product(_) | Self::Cart(_) => StatusCode::BAD_REQUEST,
            Self::Wallet(WalletError::InsufficientBalance { .. }) => StatusCode::PAYMENT_REQUIRED,
            Self::Wallet(_) => StatusCode::BAD_REQUEST,
            Self::PaymentUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "database error");
                json!({"error": "Database operation failed"})
            }
            Self::Config(_) | Self::Internal(_) | Self::Gateway(_) => {
                tracing::error!(error = %self, "request failed");
                json!({"error": self.to_string()})
            }
            Self::Validation(errors) => json!({"error": "Validation failed", "fields": errors}),
            _ => json!({"error": self.to_string()}),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ShopError::Coupon(CouponError::BelowMinimum { min: Decimal::ONE }).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ShopError::Coupon(CouponError::NotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ShopError::Wallet(WalletError::InsufficientBalance { balance: Decimal::ZERO, requested: Decimal::ONE }).status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(ShopError::Cart(CartError::OutOfStock).status(), StatusCode::CONFLICT);
        assert_eq!(ShopError::Account(AccountError::Blocked).status(), StatusCode::FORBIDDEN);
        assert_eq!(ShopError::Order(OrderError::CannotCancel).status(), StatusCode::CONFLICT);
        assert_eq!(ShopError::PaymentUnavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unique_conflict_passes_other_errors_through() {
        let err = ShopError::unique_conflict(sqlx::Error::RowNotFound, "taken");
        assert!(matches!(err, ShopError::Database(sqlx::Error::RowNotFound)));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_database_error_hidden() {
        let resp = ShopError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
