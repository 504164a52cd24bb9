use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::json;
use std::{str::FromStr, sync::Arc};
use tracing::info;

use crate::api::begin;
use crate::entities::order::{self, Status};
use crate::middleware::{auth::Claims, logging::{ApiError, AppJson}};
use crate::services::orders::{delete_order, find_order_details, load_order_details};

//ROUTERS
pub fn admin_order_router() -> Router {
    Router::new()
        .route("/orders", get(get_orders))
        .route("/orders/:id", get(get_order).delete(remove_order))
        .route("/orders/:id/status", patch(patch_status))
}

//ROUTES
async fn get_orders(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(query): Query<OrderQuery>,
) -> Result<Response, ApiError> {
    let mut select = order::Entity::find()
        .order_by_desc(order::Column::CreatedAt)
        .order_by_desc(order::Column::Id);

    if let Some(status) = query.status.as_deref() {
        select = select.filter(order::Column::Status.eq(parse_status(status)?));
    }

    let orders = select.all(db.as_ref()).await?;
    let orders = load_order_details(db.as_ref(), orders).await?;

    Ok(Json(json!({ "orders": orders })).into_response())
}

async fn get_order(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    match find_order_details(db.as_ref(), id, None).await? {
        Some(order) => Ok(Json(json!({ "order": order })).into_response()),
        None => Err(order_not_found()),
    }
}

/// Any status may follow any other.
async fn patch_status(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<PatchStatus>,
) -> Result<Response, ApiError> {
    let status = parse_status(&payload.status)?;

    let txn = begin(&db).await?;

    let Some(existing) = order::Entity::find_by_id(id).one(&txn).await? else {
        return Err(order_not_found());
    };
    let previous = existing.status;

    let mut model: order::ActiveModel = existing.into();
    model.status = Set(status);
    model.updated_at = Set(Utc::now());
    model.update(&txn).await?;

    let order = find_order_details(&txn, id, None).await?.ok_or_else(order_not_found)?;
    txn.commit().await?;

    info!(
        order_id = id,
        admin_id = claims.user_id,
        from = %previous,
        to = %status,
        "Order status changed"
    );

    Ok(Json(json!({
        "message": "Order status updated successfully",
        "order": order,
    }))
    .into_response())
}

async fn remove_order(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let txn = begin(&db).await?;

    if !delete_order(&txn, id).await? {
        return Err(order_not_found());
    }

    txn.commit().await?;
    info!(order_id = id, "Order deleted");

    Ok(Json(json!({ "message": "Order deleted successfully" })).into_response())
}

fn parse_status(value: &str) -> Result<Status, ApiError> {
    Status::from_str(value).map_err(|_| ApiError::BadRequest("Invalid status".to_owned()))
}

fn order_not_found() -> ApiError {
    ApiError::NotFound("Order not found".to_owned())
}

//Structs
#[derive(Deserialize)]
struct OrderQuery {
    status: Option<String>,
}

#[derive(Deserialize)]
struct PatchStatus {
    status: String,
}
