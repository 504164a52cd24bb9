pub mod api;
pub mod config;
pub mod entities;
pub mod middleware;
pub mod services;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::{create_api_router, AppContext};
use crate::middleware::logging::logging_middleware;

/// Full HTTP surface with request logging, tracing and CORS for the SPA.
pub fn create_app(ctx: AppContext) -> Router {
    create_api_router(ctx)
        .layer(axum::middleware::from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
