use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::entities::{order, user};
use crate::middleware::{auth::Claims, logging::{ApiError, AppJson}};
use crate::services::{
    checkout::place_order,
    orders::{find_order_details, load_order_details},
    payments::{build_preference, PaymentGateway},
};

pub fn order_router() -> Router {
    Router::new()
        .route("/orders", get(get_orders).post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/payment", post(create_payment))
}

async fn create_order(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<CreateOrder>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let shipping_address = payload.shipping_address.trim();
    if shipping_address.is_empty() {
        return Err(ApiError::BadRequest("Invalid value for: shippingAddress".to_owned()));
    }

    let order = place_order(&db, claims.user_id, shipping_address).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Order created successfully",
            "order": order,
        })),
    )
        .into_response())
}

async fn get_orders(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let orders = order::Entity::find()
        .filter(order::Column::UserId.eq(claims.user_id))
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id)
        .all(db.as_ref())
        .await?;

    let orders = load_order_details(db.as_ref(), orders).await?;

    Ok(Json(json!({ "orders": orders })).into_response())
}

async fn get_order(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    match find_order_details(db.as_ref(), id, Some(claims.user_id)).await? {
        Some(order) => Ok(Json(json!({ "order": order })).into_response()),
        None => Err(order_not_found()),
    }
}

/// Opens a MercadoPago checkout for one of the caller's orders.
async fn create_payment(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    Extension(gateway): Extension<Option<Arc<dyn PaymentGateway>>>,
) -> Result<Response, ApiError> {
    let Some(gateway) = gateway else {
        return Err(ApiError::Unavailable("Payments are not configured".to_owned()));
    };

    let Some(order) = find_order_details(db.as_ref(), id, Some(claims.user_id)).await? else {
        return Err(order_not_found());
    };
    if order.status != order::Status::Pending {
        return Err(ApiError::BadRequest("Only pending orders can be paid".to_owned()));
    }

    let Some(customer) = user::Entity::find_by_id(claims.user_id).one(db.as_ref()).await? else {
        return Err(ApiError::Unauthorized("Unauthorized".to_owned()));
    };

    let preference = gateway
        .create_preference(&build_preference(&order, &customer))
        .await?;

    info!(order_id = order.id, preference_id = %preference.id, "Created payment preference");

    Ok(Json(json!({
        "preference_id": preference.id,
        "init_point": preference.init_point,
    }))
    .into_response())
}

fn order_not_found() -> ApiError {
    ApiError::NotFound("Order not found".to_owned())
}

#[derive(Deserialize, Validate)]
struct CreateOrder {
    #[serde(rename = "shippingAddress", alias = "shipping_address")]
    #[validate(length(min = 1, max = 500))]
    shipping_address: String,
}
