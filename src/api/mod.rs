pub mod admin;
pub mod public;
pub mod user;

use axum::{Extension, Router};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use std::{sync::Arc, time::Instant};

use crate::middleware::auth::TokenSettings;
use crate::middleware::logging::ApiError;
use crate::services::{
    checkout::CheckoutError,
    payments::{PaymentError, PaymentGateway},
    shipping::{ShippingError, ShippingProvider},
};

use admin::admin_api_router;
use public::public_api_router;
use user::user_api_router;

/// Collaborators built once at startup and shared by every handler.
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<DatabaseConnection>,
    pub tokens: Arc<TokenSettings>,
    pub shipping: Arc<dyn ShippingProvider>,
    pub shipping_defaults: ShippingDefaults,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub started_at: Instant,
}

#[derive(Clone, Debug)]
pub struct ShippingDefaults {
    pub origin_postal_code: String,
    pub contract: Option<String>,
}

pub fn create_api_router(ctx: AppContext) -> Router {
    let shared = ctx.clone();
    let api = Router::new()
        .merge(public_api_router())
        .merge(user_api_router(&ctx))
        .nest("/admin", admin_api_router(&ctx));

    Router::new()
        .nest("/api", api)
        .layer(Extension(ctx.db))
        .layer(Extension(ctx.tokens))
        .layer(Extension(ctx.shipping))
        .layer(Extension(ctx.shipping_defaults))
        .layer(Extension(ctx.payments))
        .layer(Extension(shared))
}

pub(crate) async fn begin(db: &DatabaseConnection) -> Result<DatabaseTransaction, ApiError> {
    db.begin().await.map_err(ApiError::TransactionCreationFailed)
}

/// Rows to skip for a 1-based `page`. Offsets the database cannot address are a 400.
pub(crate) fn page_offset(page: u64, limit: u64) -> Result<u64, ApiError> {
    page.saturating_sub(1)
        .checked_mul(limit)
        .filter(|offset| i64::try_from(*offset).is_ok())
        .ok_or_else(|| ApiError::BadRequest("Invalid page".to_owned()))
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EmptyCart | CheckoutError::InsufficientStock { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            CheckoutError::Persistence(db_err) => ApiError::DbError(db_err),
        }
    }
}

impl From<ShippingError> for ApiError {
    fn from(err: ShippingError) -> Self {
        ApiError::Upstream(err.to_string())
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Db(db_err) => ApiError::DbError(db_err),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}
