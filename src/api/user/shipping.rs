use axum::{
    extract::{Extension, Path},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::middleware::{auth::Claims, logging::{ApiError, AppJson}};
use crate::services::shipping::{ShipmentRequest, ShippingProvider};

pub fn shipping_router() -> Router {
    Router::new()
        .route("/shipping/shipments", post(create_shipment))
        .route("/shipping/shipments/:number", delete(cancel_shipment))
        .route("/shipping/tracking/:number", get(tracking))
        .route("/shipping/labels/:number", get(label))
}

async fn create_shipment(
    Extension(provider): Extension<Arc<dyn ShippingProvider>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<ShipmentRequest>,
) -> Result<Response, ApiError> {
    payload.validate()?;

    let shipment = provider.create_shipment(&payload).await?;
    info!(
        user_id = claims.user_id,
        shipment_number = %shipment.shipment_number,
        provider = provider.name(),
        "Shipment created"
    );

    Ok((StatusCode::CREATED, Json(shipment)).into_response())
}

async fn tracking(
    Path(number): Path<String>,
    Extension(provider): Extension<Arc<dyn ShippingProvider>>,
) -> Result<Response, ApiError> {
    let tracking = provider.tracking(&number).await?;
    Ok(Json(tracking).into_response())
}

async fn label(
    Path(number): Path<String>,
    Extension(provider): Extension<Arc<dyn ShippingProvider>>,
) -> Result<Response, ApiError> {
    let label = provider.label(&number).await?;
    let disposition = format!("attachment; filename=label-{number}.pdf");

    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_owned()),
            (CONTENT_DISPOSITION, disposition),
        ],
        label,
    )
        .into_response())
}

async fn cancel_shipment(
    Path(number): Path<String>,
    Extension(provider): Extension<Arc<dyn ShippingProvider>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let cancellation = provider.cancel_shipment(&number).await?;
    info!(user_id = claims.user_id, shipment_number = %number, "Shipment cancelled");
    Ok(Json(cancellation).into_response())
}
