use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::aggregates::{OfferBook, PricedLine, PricedProduct, Product};
use crate::error::Result;

/// A product joined with the listing state of its category.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CatalogRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub product: Product,
    pub category_listed: bool,
    pub category_name: String,
}

pub const SELECT_CATALOG: &str = "SELECT p.*, c.is_listed AS category_listed, c.name AS category_name FROM products p JOIN categories c ON c.id = p.category_id";

impl CatalogRow {
    pub fn is_visible(&self) -> bool { self.category_listed && self.product.status == crate::domain::aggregates::ProductStatus::Active }

    pub fn priced(&self, book: &OfferBook, currency: &str, now: DateTime<Utc>) -> PricedProduct {
        book.price(self.product.id, self.product.category_id, self.product.price_money(currency), now)
    }

    pub fn line(&self, quantity: i32, book: &OfferBook, currency: &str, now: DateTime<Utc>) -> PricedLine {
        let priced = self.priced(book, currency, now);
        PricedLine {
            product_id: self.product.id,
            name: self.product.name.clone(),
            image: self.product.main_image().map(str::to_string),
            quantity,
            stock: self.product.stock,
            line_total: priced.sale_price.multiply(u32::try_from(quantity).unwrap_or(0)),
            unit_price: priced.price,
            sale_price: priced.sale_price,
            offer: priced.offer,
        }
    }
}

pub async fn find_product(conn: &mut PgConnection, id: Uuid) -> Result<Option<CatalogRow>> {
    Ok(sqlx::query_as::<_, CatalogRow>(&format!("{SELECT_CATALOG} WHERE p.id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?)
}

pub async fn find_products(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<CatalogRow>> {
    if ids.is_empty() { return Ok(vec![]); }
    Ok(sqlx::query_as::<_, CatalogRow>(&format!("{SELECT_CATALOG} WHERE p.id = ANY($1)"))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?)
}

/// Same as [`find_products`] but row-locks the products for a stock update.
pub async fn lock_products(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<CatalogRow>> {
    if ids.is_empty() { return Ok(vec![]); }
    Ok(sqlx::query_as::<_, CatalogRow>(&format!("{SELECT_CATALOG} WHERE p.id = ANY($1) ORDER BY p.id FOR UPDATE OF p"))
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?)
}
