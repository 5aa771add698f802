//! Shopfront - storefront and admin back-office API
//!
//! Catalog, offers, coupons, cart, checkout (COD, Razorpay, wallet), orders,
//! wallet ledger, wishlist, addresses, referrals and sales reports.

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod store;

use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::Config;
pub use error::{Result, ShopError};
use services::{EventBus, Mailer, PaymentGateway};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub events: EventBus,
    pub config: Arc<Config>,
    /// `None` when no gateway keys are configured; online payment then answers 503.
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn payments(&self) -> Result<&Arc<dyn PaymentGateway>> {
        self.payments.as_ref().ok_or(ShopError::PaymentUnavailable)
    }
}

pub fn build_router(state: AppState) -> Router {
    api::router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
