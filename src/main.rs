use sea_orm::{Database, DbErr};
use std::{sync::Arc, time::Instant};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use storefront_api::api::{AppContext, ShippingDefaults};
use storefront_api::config::{Config, ConfigError};
use storefront_api::create_app;
use storefront_api::entities::{seed_admin, setup_schema, SeedError};
use storefront_api::middleware::auth::TokenSettings;
use storefront_api::services::payments::{MercadoPagoGateway, PaymentError, PaymentGateway};
use storefront_api::services::shipping::{provider_from_config, ShippingError};

#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to prepare database: {0}")]
    Database(#[from] DbErr),
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error(transparent)]
    Shipping(#[from] ShippingError),
    #[error(transparent)]
    Payments(#[from] PaymentError),
    #[error("Failed to serve: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let started_at = Instant::now();

    let db = Database::connect(&config.database_url).await?;
    setup_schema(&db).await?;

    match &config.admin {
        Some(seed) => seed_admin(&db, seed).await?,
        None => warn!("ADMIN_EMAIL/ADMIN_PASSWORD not set, no administrator seeded"),
    }

    let shipping = provider_from_config(&config.andreani)?;

    let payments: Option<Arc<dyn PaymentGateway>> = match &config.mercadopago {
        Some(mp) => Some(Arc::new(MercadoPagoGateway::new(mp)?)),
        None => {
            warn!("MP_ACCESS_TOKEN not set, payment routes will answer 503");
            None
        }
    };

    let ctx = AppContext {
        db: Arc::new(db),
        tokens: Arc::new(TokenSettings {
            secret: config.jwt_secret.clone(),
            ttl_hours: config.token_ttl_hours,
        }),
        shipping,
        shipping_defaults: ShippingDefaults {
            origin_postal_code: config.andreani.origin_postal_code.clone(),
            contract: config.andreani.contract.clone(),
        },
        payments,
        started_at,
    };

    let app = create_app(ctx);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
