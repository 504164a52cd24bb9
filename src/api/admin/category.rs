use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{patch, post},
    Json, Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::api::begin;
use crate::entities::{category, category::Entity as CategoryEntity, product};
use crate::middleware::logging::{ApiError, AppJson};

//ROUTERS
pub fn admin_category_router() -> Router {
    Router::new()
        .route("/categories", post(create_category))
        .route(
            "/categories/:id",
            patch(patch_category).delete(delete_category),
        )
}

//ROUTES
async fn create_category(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    AppJson(payload): AppJson<CreateCategory>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let name = payload.name.trim().to_owned();

    let txn = begin(&db).await?;

    if name_taken(&txn, &name, None).await? {
        return Err(category_exists());
    }

    let created = category::ActiveModel {
        name: Set(name),
        description: Set(payload.description),
        image: Set(payload.image),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(category_id = created.id, "Category created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Category created successfully",
            "category": created,
        })),
    )
        .into_response())
}

async fn patch_category(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    AppJson(payload): AppJson<PatchCategory>,
) -> Result<Response, ApiError> {
    payload.validate()?;

    let txn = begin(&db).await?;

    let Some(existing) = CategoryEntity::find_by_id(id).one(&txn).await? else {
        return Err(category_not_found());
    };
    let mut category: category::ActiveModel = existing.into();

    if let Some(name) = payload.name {
        let name = name.trim().to_owned();
        if name_taken(&txn, &name, Some(id)).await? {
            return Err(category_exists());
        }
        category.name = Set(name);
    }
    if let Some(description) = payload.description {
        category.description = Set(Some(description));
    }
    if let Some(image) = payload.image {
        category.image = Set(Some(image));
    }

    let updated = category.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(json!({
        "message": "Category updated successfully",
        "category": updated,
    }))
    .into_response())
}

async fn delete_category(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let txn = begin(&db).await?;

    if CategoryEntity::find_by_id(id).one(&txn).await?.is_none() {
        return Err(category_not_found());
    }

    let products = product::Entity::find()
        .filter(product::Column::CategoryId.eq(id))
        .count(&txn)
        .await?;
    if products > 0 {
        return Err(ApiError::Conflict(
            "Category still has products".to_owned(),
        ));
    }

    CategoryEntity::delete_by_id(id).exec(&txn).await?;
    txn.commit().await?;
    info!(category_id = id, "Category deleted");

    Ok(Json(json!({ "message": "Category deleted successfully" })).into_response())
}

async fn name_taken<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    except: Option<i32>,
) -> Result<bool, ApiError> {
    let mut query = CategoryEntity::find().filter(category::Column::Name.eq(name));
    if let Some(id) = except {
        query = query.filter(category::Column::Id.ne(id));
    }
    Ok(query.one(conn).await?.is_some())
}

fn category_not_found() -> ApiError {
    ApiError::NotFound("Category not found".to_owned())
}

fn category_exists() -> ApiError {
    ApiError::Conflict("Category already exists".to_owned())
}

//Struct
#[derive(Deserialize, Validate)]
struct CreateCategory {
    #[validate(length(min = 1, max = 100))]
    name: String,
    description: Option<String>,
    #[validate(length(max = 255))]
    image: Option<String>,
}

#[derive(Deserialize, Validate)]
struct PatchCategory {
    #[validate(length(min = 1, max = 100))]
    name: Option<String>,
    description: Option<String>,
    #[validate(length(max = 255))]
    image: Option<String>,
}
