//! Shopfront service entry point

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopfront::services::{EventBus, LogMailer, PaymentGateway, RazorpayGateway};
use shopfront::{build_router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let events = EventBus::connect(config.nats_url.as_deref()).await;
    let payments = match (&config.razorpay_key_id, &config.razorpay_key_secret) {
        (Some(id), Some(secret)) => Some(Arc::new(RazorpayGateway::new(id, secret)) as Arc<dyn PaymentGateway>),
        _ => {
            tracing::warn!("RAZORPAY_KEY_ID/RAZORPAY_KEY_SECRET not set, online payments disabled");
            None
        }
    };
    let mailer = Arc::new(LogMailer::default());

    let port = config.port;
    let state = AppState { db, events, config: Arc::new(config), payments, mailer };
    let app = build_router(state);

    tracing::info!("shopfront listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}
