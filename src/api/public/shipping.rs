use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use validator::Validate;

use crate::api::ShippingDefaults;
use crate::middleware::logging::{ApiError, AppJson};
use crate::services::shipping::{
    estimate_cart, BranchFilter, CartEstimateRequest, QuoteRequest, ShippingProvider,
};

pub fn shipping_router() -> Router {
    Router::new()
        .route("/shipping/quote", post(quote))
        .route("/shipping/branches", get(branches))
        .route("/shipping/estimate", post(estimate))
        .route("/shipping/postal-codes/:code", get(validate_postal_code))
}

async fn quote(
    Extension(provider): Extension<Arc<dyn ShippingProvider>>,
    AppJson(payload): AppJson<QuoteRequest>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let quote = provider.quote(&payload).await?;
    Ok(Json(quote).into_response())
}

async fn branches(
    Query(filter): Query<BranchFilter>,
    Extension(provider): Extension<Arc<dyn ShippingProvider>>,
) -> Result<Response, ApiError> {
    let branches = provider.branches(&filter).await?;
    Ok(Json(branches).into_response())
}

async fn estimate(
    Extension(provider): Extension<Arc<dyn ShippingProvider>>,
    Extension(defaults): Extension<ShippingDefaults>,
    AppJson(payload): AppJson<CartEstimateRequest>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let estimate = estimate_cart(
        provider.as_ref(),
        &defaults.origin_postal_code,
        defaults.contract.clone(),
        &payload,
    )
    .await;
    Ok(Json(estimate).into_response())
}

async fn validate_postal_code(
    Path(code): Path<String>,
    Extension(provider): Extension<Arc<dyn ShippingProvider>>,
) -> Result<Response, ApiError> {
    let check = provider.validate_postal_code(code.trim()).await?;
    Ok(Json(check).into_response())
}
