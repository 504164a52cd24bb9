use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use serde_json::json;
use std::sync::Arc;

use crate::entities::category::{self, Entity as CategoryEntity};
use crate::middleware::logging::ApiError;

pub fn category_router() -> Router {
    Router::new()
        .route("/categories", get(get_categories))
        .route("/categories/:id", get(get_category))
}

async fn get_categories(
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let categories = CategoryEntity::find()
        .order_by_asc(category::Column::Name)
        .all(db.as_ref())
        .await?;

    Ok(Json(json!({ "categories": categories })).into_response())
}

async fn get_category(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    match CategoryEntity::find_by_id(id).one(db.as_ref()).await? {
        Some(category) => Ok(Json(json!({ "category": category })).into_response()),
        None => Err(ApiError::NotFound("Category not found".to_owned())),
    }
}
