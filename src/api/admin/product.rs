use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{patch, post},
    Json, Router,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::api::{begin, public::product::ProductResponse};
use crate::entities::{
    cart, category, order_item,
    product::{self, Entity as ProductEntity},
};
use crate::middleware::logging::{ApiError, AppJson};

//ROUTERS
pub fn admin_product_router() -> Router {
    Router::new()
        .route("/products", post(create_product))
        .route(
            "/products/:id",
            patch(patch_product).delete(delete_product),
        )
}

//ROUTES
async fn create_product(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    AppJson(payload): AppJson<CreateProduct>,
) -> Result<Response, ApiError> {
    payload.validate()?;

    let txn = begin(&db).await?;

    let Some(category) = category::Entity::find_by_id(payload.category_id).one(&txn).await? else {
        return Err(category_not_found());
    };

    let created = product::ActiveModel {
        name: Set(payload.name.trim().to_owned()),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock),
        image: Set(payload.image),
        category_id: Set(category.id),
        featured: Set(payload.featured.unwrap_or_default()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(product_id = created.id, "Product created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Product created successfully",
            "product": ProductResponse::new(created, Some(category)),
        })),
    )
        .into_response())
}

async fn patch_product(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    AppJson(payload): AppJson<PatchProductPayload>,
) -> Result<Response, ApiError> {
    payload.validate()?;

    let txn = begin(&db).await?;

    let Some(existing) = ProductEntity::find_by_id(id).one(&txn).await? else {
        return Err(product_not_found());
    };
    let mut product: product::ActiveModel = existing.into();

    if let Some(name) = payload.name {
        product.name = Set(name.trim().to_owned());
    }
    if let Some(description) = payload.description {
        product.description = Set(description);
    }
    if let Some(price) = payload.price {
        product.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        product.stock = Set(stock);
    }
    if let Some(image) = payload.image {
        product.image = Set(Some(image));
    }
    if let Some(category_id) = payload.category_id {
        if category::Entity::find_by_id(category_id).one(&txn).await?.is_none() {
            return Err(category_not_found());
        }
        product.category_id = Set(category_id);
    }
    if let Some(featured) = payload.featured {
        product.featured = Set(featured);
    }

    let updated = product.update(&txn).await?;
    let category = category::Entity::find_by_id(updated.category_id).one(&txn).await?;
    txn.commit().await?;

    Ok(Json(json!({
        "message": "Product updated successfully",
        "product": ProductResponse::new(updated, category),
    }))
    .into_response())
}

/// Cart lines go with the product. Products that were ever ordered stay, so
/// past orders keep their lines.
async fn delete_product(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let txn = begin(&db).await?;

    if ProductEntity::find_by_id(id).one(&txn).await?.is_none() {
        return Err(product_not_found());
    }

    let ordered = order_item::Entity::find()
        .filter(order_item::Column::ProductId.eq(id))
        .count(&txn)
        .await?;
    if ordered > 0 {
        return Err(ApiError::Conflict(
            "Product has order history and cannot be deleted".to_owned(),
        ));
    }

    cart::Entity::delete_many()
        .filter(cart::Column::ProductId.eq(id))
        .exec(&txn)
        .await?;
    ProductEntity::delete_by_id(id).exec(&txn).await?;

    txn.commit().await?;
    info!(product_id = id, "Product deleted");

    Ok(Json(json!({ "message": "Product deleted successfully" })).into_response())
}

fn product_not_found() -> ApiError {
    ApiError::NotFound("Product not found".to_owned())
}

fn category_not_found() -> ApiError {
    ApiError::NotFound("Category not found".to_owned())
}

//Structs
#[derive(Deserialize, Validate)]
struct CreateProduct {
    #[validate(length(min = 1, max = 200))]
    name: String,
    description: String,
    #[validate(range(min = 0.0))]
    price: f64,
    #[validate(range(min = 0))]
    stock: i32,
    #[validate(length(max = 255))]
    image: Option<String>,
    category_id: i32,
    featured: Option<bool>,
}

#[derive(Deserialize, Validate)]
struct PatchProductPayload {
    #[validate(length(min = 1, max = 200))]
    name: Option<String>,
    description: Option<String>,
    #[validate(range(min = 0.0))]
    price: Option<f64>,
    #[validate(range(min = 0))]
    stock: Option<i32>,
    #[validate(length(max = 255))]
    image: Option<String>,
    category_id: Option<i32>,
    featured: Option<bool>,
}
