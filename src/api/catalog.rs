use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use crate::api::extract::AdminUser;
use crate::api::{like_pattern, Page, Paginated};
use crate::domain::aggregates::{slugify, AppliedOffer, Category, Product, ProductDraft, ProductError, ProductStatus};
use crate::domain::value_objects::Money;
use crate::error::{Result, ShopError};
use crate::store::catalog::{self, CatalogRow, SELECT_CATALOG};
use crate::store::offers;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories))
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/categories", get(admin_list_categories).post(create_category))
        .route("/categories/:id", put(update_category))
        .route("/categories/:id/list", post(list_category))
        .route("/categories/:id/unlist", post(unlist_category))
        .route("/products", get(admin_list_products).post(create_product))
        .route("/products/:id", get(admin_get_product).put(update_product))
        .route("/products/:id/stock", put(update_stock))
        .route("/products/:id/list", post(list_product))
        .route("/products/:id/unlist", post(unlist_product))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort { PriceAsc, PriceDesc, NameAsc, NameDesc, #[default] Newest }

impl ProductSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::PriceAsc => "p.price ASC, p.id",
            Self::PriceDesc => "p.price DESC, p.id",
            Self::NameAsc => "LOWER(p.name) ASC, p.id",
            Self::NameDesc => "LOWER(p.name) DESC, p.id",
            Self::Newest => "p.created_at DESC, p.id",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<Uuid>,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: String,
    pub sale_price: Money,
    pub offer: Option<AppliedOffer>,
    pub in_stock: bool,
}

impl ProductView {
    fn new(row: CatalogRow, book: &crate::domain::aggregates::OfferBook, currency: &str) -> Self {
        let priced = row.priced(book, currency, Utc::now());
        Self { in_stock: row.product.is_in_stock(), category_name: row.category_name, sale_price: priced.sale_price, offer: priced.offer, product: row.product }
    }
}

const SHOP_FILTER: &str = "p.status = 'active' AND c.is_listed AND ($1::uuid IS NULL OR p.category_id = $1) AND ($2::text IS NULL OR p.name ILIKE $2 OR p.brand ILIKE $2)";

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    let cats = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE is_listed ORDER BY name").fetch_all(&s.db).await?;
    Ok(Json(cats))
}

async fn list_products(State(s): State<AppState>, Query(q): Query<ProductQuery>) -> Result<Json<Paginated<ProductView>>> {
    let page = Page { page: q.page, per_page: q.per_page };
    let pattern = like_pattern(q.search.as_deref());
    let mut conn = s.db.acquire().await?;
    let rows = sqlx::query_as::<_, CatalogRow>(&format!("{SELECT_CATALOG} WHERE {SHOP_FILTER} ORDER BY {} LIMIT $3 OFFSET $4", q.sort.order_by()))
        .bind(q.category).bind(&pattern).bind(page.limit()).bind(page.offset())
        .fetch_all(&mut *conn)
        .await?;
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products p JOIN categories c ON c.id = p.category_id WHERE {SHOP_FILTER}"))
        .bind(q.category).bind(&pattern)
        .fetch_one(&mut *conn)
        .await?;
    let book = offers::load_offer_book(&mut conn).await?;
    let data = rows.into_iter().map(|r| ProductView::new(r, &book, &s.config.currency)).collect();
    Ok(Json(page.wrap(data, total)))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductView>> {
    let mut conn = s.db.acquire().await?;
    let row = catalog::find_product(&mut conn, id).await?
        .filter(CatalogRow::is_visible)
        .ok_or(ShopError::NotFound("Product"))?;
    let book = offers::load_offer_book(&mut conn).await?;
    Ok(Json(ProductView::new(row, &book, &s.config.currency)))
}

// ---- admin: categories ----

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest { #[validate(length(min = 1, max = 80))] pub name: String, pub description: Option<String> }

async fn ensure_category_name_free(s: &AppState, name: &str, except: Option<Uuid>) -> Result<()> {
    let taken: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE LOWER(name) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2))")
        .bind(name.trim()).bind(except)
        .fetch_one(&s.db)
        .await?;
    if taken { return Err(ShopError::Conflict(format!("Category '{}' already exists", name.trim()))); }
    Ok(())
}

async fn admin_list_categories(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Category>>> {
    Ok(Json(sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name").fetch_all(&s.db).await?))
}

async fn create_category(State(s): State<AppState>, _admin: AdminUser, Json(r): Json<CategoryRequest>) -> Result<(StatusCode, Json<Category>)> {
    r.validate()?;
    ensure_category_name_free(&s, &r.name, None).await?;
    let c = sqlx::query_as::<_, Category>("INSERT INTO categories (id, name, slug, description, is_listed, created_at) VALUES ($1, $2, $3, $4, TRUE, NOW()) RETURNING *")
        .bind(Uuid::now_v7()).bind(r.name.trim()).bind(slugify(&r.name)).bind(&r.description)
        .fetch_one(&s.db)
        .await?;
    Ok((StatusCode::CREATED, Json(c)))
}

async fn update_category(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<CategoryRequest>) -> Result<Json<Category>> {
    r.validate()?;
    ensure_category_name_free(&s, &r.name, Some(id)).await?;
    sqlx::query_as::<_, Category>("UPDATE categories SET name = $2, slug = $3, description = $4 WHERE id = $1 RETURNING *")
        .bind(id).bind(r.name.trim()).bind(slugify(&r.name)).bind(&r.description)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound("Category"))
}

async fn set_category_listed(s: &AppState, id: Uuid, listed: bool) -> Result<Json<Category>> {
    sqlx::query_as::<_, Category>("UPDATE categories SET is_listed = $2 WHERE id = $1 RETURNING *")
        .bind(id).bind(listed)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound("Category"))
}

async fn list_category(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Category>> { set_category_listed(&s, id, true).await }
async fn unlist_category(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Category>> { set_category_listed(&s, id, false).await }

// ---- admin: products ----

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub brand: Option<String>,
    pub category_id: Uuid,
    #[validate(custom = "crate::api::money")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub images: Vec<String>,
    #[serde(default)]
    pub specs: Value,
}

impl ProductRequest {
    fn check(&self) -> Result<()> {
        self.validate()?;
        ProductDraft { name: &self.name, price: self.price, stock: self.stock, images: &self.images }.validate()?;
        Ok(())
    }

    fn specs(&self) -> Value {
        if self.specs.is_null() { Value::Object(Default::default()) } else { self.specs.clone() }
    }
}

#[derive(Debug, Deserialize)] pub struct AdminProductQuery { pub search: Option<String>, pub status: Option<ProductStatus>, pub page: Option<u32>, pub per_page: Option<u32> }
#[derive(Debug, Deserialize)] pub struct StockRequest { pub stock: i32 }

async fn ensure_category(s: &AppState, id: Uuid) -> Result<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)").bind(id).fetch_one(&s.db).await?;
    if !exists { return Err(ShopError::NotFound("Category")); }
    Ok(())
}

async fn admin_list_products(State(s): State<AppState>, _admin: AdminUser, Query(q): Query<AdminProductQuery>) -> Result<Json<Paginated<CatalogRow>>> {
    let page = Page { page: q.page, per_page: q.per_page };
    let pattern = like_pattern(q.search.as_deref());
    let filter = "($1::text IS NULL OR p.name ILIKE $1 OR p.brand ILIKE $1) AND ($2::product_status IS NULL OR p.status = $2)";
    let rows = sqlx::query_as::<_, CatalogRow>(&format!("{SELECT_CATALOG} WHERE {filter} ORDER BY p.created_at DESC LIMIT $3 OFFSET $4"))
        .bind(&pattern).bind(q.status).bind(page.limit()).bind(page.offset())
        .fetch_all(&s.db)
        .await?;
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products p WHERE {filter}"))
        .bind(&pattern).bind(q.status)
        .fetch_one(&s.db)
        .await?;
    Ok(Json(page.wrap(rows, total)))
}

async fn admin_get_product(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<CatalogRow>> {
    let mut conn = s.db.acquire().await?;
    catalog::find_product(&mut conn, id).await?.map(Json).ok_or(ShopError::NotFound("Product"))
}

async fn create_product(State(s): State<AppState>, _admin: AdminUser, Json(r): Json<ProductRequest>) -> Result<(StatusCode, Json<Product>)> {
    r.check()?;
    ensure_category(&s, r.category_id).await?;
    let p = sqlx::query_as::<_, Product>(
        "INSERT INTO products (id, name, description, brand, category_id, price, stock, images, specs, status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active', NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7()).bind(r.name.trim()).bind(&r.description).bind(&r.brand).bind(r.category_id)
    .bind(r.price).bind(r.stock).bind(&r.images).bind(r.specs())
    .fetch_one(&s.db)
    .await?;
    tracing::info!(product_id = %p.id, "product created");
    Ok((StatusCode::CREATED, Json(p)))
}

async fn update_product(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<ProductRequest>) -> Result<Json<Product>> {
    r.check()?;
    ensure_category(&s, r.category_id).await?;
    sqlx::query_as::<_, Product>(
        "UPDATE products SET name = $2, description = $3, brand = $4, category_id = $5, price = $6, stock = $7, images = $8, specs = $9, updated_at = NOW() \
         WHERE id = $1 RETURNING *",
    )
    .bind(id).bind(r.name.trim()).bind(&r.description).bind(&r.brand).bind(r.category_id)
    .bind(r.price).bind(r.stock).bind(&r.images).bind(r.specs())
    .fetch_optional(&s.db)
    .await?
    .map(Json)
    .ok_or(ShopError::NotFound("Product"))
}

async fn update_stock(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(r): Json<StockRequest>) -> Result<Json<Product>> {
    if r.stock < 0 { return Err(ProductError::InvalidStock.into()); }
    sqlx::query_as::<_, Product>("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(r.stock)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound("Product"))
}

async fn set_product_status(s: &AppState, id: Uuid, status: ProductStatus) -> Result<Json<Product>> {
    sqlx::query_as::<_, Product>("UPDATE products SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
        .bind(id).bind(status)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(ShopError::NotFound("Product"))
}

async fn list_product(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Product>> { set_product_status(&s, id, ProductStatus::Active).await }
async fn unlist_product(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<Product>> { set_product_status(&s, id, ProductStatus::Unlisted).await }
