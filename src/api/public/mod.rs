pub mod auth;
pub mod category;
pub mod health;
pub mod product;
pub mod shipping;
pub mod webhooks;

use axum::Router;

use auth::auth_router;
use category::category_router;
use health::health_router;
use product::product_router;
use shipping::shipping_router;
use webhooks::webhook_router;

pub fn public_api_router() -> Router {
    Router::new()
        .merge(auth_router())
        .merge(category_router())
        .merge(product_router())
        .merge(shipping_router())
        .merge(webhook_router())
        .merge(health_router())
}
