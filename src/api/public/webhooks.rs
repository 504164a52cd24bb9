use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::middleware::logging::{to_response, ApiError, AppJson};
use crate::services::payments::{handle_notification, Notification, PaymentGateway};

pub fn webhook_router() -> Router {
    Router::new().route("/webhooks/mercadopago", post(mercadopago_webhook))
}

async fn mercadopago_webhook(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(gateway): Extension<Option<Arc<dyn PaymentGateway>>>,
    AppJson(notification): AppJson<Notification>,
) -> Response {
    let Some(gateway) = gateway else {
        return ApiError::Unavailable("Payments are not configured".to_owned()).into_response();
    };

    match handle_notification(db.as_ref(), gateway.as_ref(), &notification).await {
        Ok(outcome) => {
            info!(?outcome, "MercadoPago notification handled");
            Json(json!({ "received": true })).into_response()
        }
        Err(err) => to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Error processing webhook" })),
            ),
            Err(ApiError::from(err)),
        ),
    }
}
