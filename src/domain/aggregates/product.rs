//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "product_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus { #[default] Active, Unlisted }

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub brand: Option<String>,
    pub category_id: Uuid,
    pub price: Decimal,
    pub stock: i32,
    pub images: Vec<String>,
    pub specs: serde_json::Value,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn price_money(&self, currency: &str) -> Money { Money::new(self.price, currency) }
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }
    pub fn main_image(&self) -> Option<&str> { self.images.first().map(String::as_str) }

    /// Whether `quantity` units can be sold right now.
    pub fn ensure_purchasable(&self, quantity: i32, category_listed: bool) -> Result<(), ProductError> {
        if self.status != ProductStatus::Active || !category_listed { return Err(ProductError::Unavailable); }
        let requested = u32::try_from(quantity).map_err(|_| ProductError::InvalidStock)?;
        Quantity::new(u32::try_from(self.stock).unwrap_or(0))
            .subtract(requested)
            .map(|_| ())
            .ok_or(ProductError::InsufficientInventory { available: self.stock })
    }
}

/// Admin-supplied product fields, checked before insert or update.
#[derive(Clone, Debug)]
pub struct ProductDraft<'a> {
    pub name: &'a str,
    pub price: Decimal,
    pub stock: i32,
    pub images: &'a [String],
}

impl ProductDraft<'_> {
    pub fn validate(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.price <= Decimal::ZERO { return Err(ProductError::InvalidPrice); }
        if self.stock < 0 { return Err(ProductError::InvalidStock); }
        if self.images.iter().any(|u| !(u.starts_with("https://") || u.starts_with("http://"))) {
            return Err(ProductError::InvalidImage);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductError { MissingName, InvalidPrice, InvalidStock, InvalidImage, Unavailable, InsufficientInventory { available: i32 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Missing name"),
            Self::InvalidPrice => write!(f, "Price must be positive"),
            Self::InvalidStock => write!(f, "Stock cannot be negative"),
            Self::InvalidImage => write!(f, "Image must be an http(s) URL"),
            Self::Unavailable => write!(f, "Product is not available"),
            Self::InsufficientInventory { available } => write!(f, "Insufficient inventory: {available} left"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(stock: i32) -> Product {
        Product {
            id: Uuid::new_v4(), name: "Phone".into(), description: String::new(), brand: Some("Acme".into()),
            category_id: Uuid::new_v4(), price: Decimal::new(19999, 0), stock, images: vec![],
            specs: serde_json::json!({"ram": "8GB"}), status: ProductStatus::Active,
            created_at: Utc::now(), updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_inventory() {
        let p = product(5);
        assert!(p.is_in_stock());
        assert!(p.ensure_purchasable(5, true).is_ok());
        assert_eq!(p.ensure_purchasable(6, true), Err(ProductError::InsufficientInventory { available: 5 }));
    }

    #[test]
    fn test_unlisted_not_purchasable() {
        let mut p = product(5);
        assert_eq!(p.ensure_purchasable(1, false), Err(ProductError::Unavailable));
        p.status = ProductStatus::Unlisted;
        assert_eq!(p.ensure_purchasable(1, true), Err(ProductError::Unavailable));
    }

    #[test]
    fn test_draft_validation() {
        let images = vec!["https://cdn.example.com/a.jpg".to_string()];
        let ok = ProductDraft { name: "Phone", price: Decimal::ONE, stock: 0, images: &images };
        assert!(ok.validate().is_ok());
        assert_eq!(ProductDraft { price: Decimal::ZERO, ..ok.clone() }.validate(), Err(ProductError::InvalidPrice));
        assert_eq!(ProductDraft { stock: -1, ..ok.clone() }.validate(), Err(ProductError::InvalidStock));
        assert_eq!(ProductDraft { name: " ", ..ok.clone() }.validate(), Err(ProductError::MissingName));
        let bad = vec!["ftp://x".to_string()];
        assert_eq!(ProductDraft { images: &bad, ..ok }.validate(), Err(ProductError::InvalidImage));
    }
}
