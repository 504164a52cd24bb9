use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::api::AppContext;

pub fn health_router() -> Router {
    Router::new().route("/health", get(health))
}

async fn health(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(ctx): Extension<AppContext>,
) -> Response {
    let timestamp = Utc::now().to_rfc3339();
    let uptime_secs = ctx.started_at.elapsed().as_secs();

    match db.ping().await {
        Ok(()) => Json(json!({
            "status": "healthy",
            "database": "connected",
            "timestamp": timestamp,
            "uptime_secs": uptime_secs,
        }))
        .into_response(),
        Err(err) => {
            error!(error = %err, "Health check could not reach the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "disconnected",
                    "timestamp": timestamp,
                    "uptime_secs": uptime_secs,
                })),
            )
                .into_response()
        }
    }
}
