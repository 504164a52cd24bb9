use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::api::begin;
use crate::entities::{cart, cart::Entity as CartEntity, product};
use crate::middleware::{auth::Claims, logging::{ApiError, AppJson}};

//ROUTERS
pub fn cart_router() -> Router {
    Router::new()
        .route("/cart", get(get_cart).post(add_product).delete(clear_cart))
        .route("/cart/:id", patch(patch_entry).delete(remove_product))
}

async fn get_cart(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    let rows = CartEntity::find()
        .filter(cart::Column::UserId.eq(claims.user_id))
        .order_by_asc(cart::Column::Id)
        .find_also_related(product::Entity)
        .all(db.as_ref())
        .await?;

    let items: Vec<CartItemResponse> = rows
        .into_iter()
        .map(|(entry, product)| CartItemResponse::new(entry, product))
        .collect();

    Ok(Json(json!({
        "total": cart_total(&items),
        "items": items,
    }))
    .into_response())
}

async fn add_product(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<AddProduct>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let user_id = claims.user_id;

    let txn = begin(&db).await?;

    let Some(product) = product::Entity::find_by_id(payload.product_id).one(&txn).await? else {
        return Err(ApiError::NotFound("Product not found".to_owned()));
    };

    let existing = CartEntity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .filter(cart::Column::ProductId.eq(product.id))
        .one(&txn)
        .await?;

    let wanted = existing
        .as_ref()
        .map_or(0, |entry| entry.quantity)
        .checked_add(payload.quantity)
        .filter(|wanted| *wanted <= product.stock)
        .ok_or_else(insufficient_stock)?;

    let (status, message, entry) = match existing {
        Some(entry) => {
            let mut entry: cart::ActiveModel = entry.into();
            entry.quantity = Set(wanted);
            let entry = entry.update(&txn).await?;
            (StatusCode::OK, "Cart updated successfully", entry)
        }
        None => {
            let entry = cart::ActiveModel {
                user_id: Set(user_id),
                product_id: Set(product.id),
                quantity: Set(wanted),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|err| match err.sql_err() {
                // a concurrent request created the line first
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    ApiError::Conflict("Cart was modified concurrently, try again".to_owned())
                }
                _ => ApiError::DbError(err),
            })?;
            (StatusCode::CREATED, "Product added to cart successfully", entry)
        }
    };

    txn.commit().await?;

    Ok((
        status,
        Json(json!({
            "message": message,
            "item": CartItemResponse::new(entry, Some(product)),
        })),
    )
        .into_response())
}

async fn patch_entry(
    Path(id): Path<i32>,
    Extension(claims): Extension<Claims>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    AppJson(payload): AppJson<PatchCart>,
) -> Result<Response, ApiError> {
    payload.validate()?;

    let txn = begin(&db).await?;

    let Some(entry) = CartEntity::find_by_id(id)
        .filter(cart::Column::UserId.eq(claims.user_id))
        .one(&txn)
        .await?
    else {
        return Err(cart_item_not_found());
    };

    if payload.quantity == 0 {
        CartEntity::delete_by_id(entry.id).exec(&txn).await?;
        txn.commit().await?;
        return Ok(Json(json!({ "message": "Item removed from cart" })).into_response());
    }

    let Some(product) = product::Entity::find_by_id(entry.product_id).one(&txn).await? else {
        return Err(ApiError::NotFound("Product not found".to_owned()));
    };
    if payload.quantity > product.stock {
        return Err(insufficient_stock());
    }

    let mut entry: cart::ActiveModel = entry.into();
    entry.quantity = Set(payload.quantity);
    let entry = entry.update(&txn).await?;

    txn.commit().await?;

    Ok(Json(json!({
        "message": "Cart updated successfully",
        "item": CartItemResponse::new(entry, Some(product)),
    }))
    .into_response())
}

async fn remove_product(
    Path(id): Path<i32>,
    Extension(claims): Extension<Claims>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let result = CartEntity::delete_many()
        .filter(cart::Column::Id.eq(id))
        .filter(cart::Column::UserId.eq(claims.user_id))
        .exec(db.as_ref())
        .await?;

    if result.rows_affected == 0 {
        return Err(cart_item_not_found());
    }

    Ok(Json(json!({ "message": "Item removed from cart successfully" })).into_response())
}

async fn clear_cart(
    Extension(claims): Extension<Claims>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    CartEntity::delete_many()
        .filter(cart::Column::UserId.eq(claims.user_id))
        .exec(db.as_ref())
        .await?;

    Ok(Json(json!({ "message": "Cart cleared successfully" })).into_response())
}

fn insufficient_stock() -> ApiError {
    ApiError::BadRequest("Insufficient stock".to_owned())
}

fn cart_item_not_found() -> ApiError {
    ApiError::NotFound("Cart item not found".to_owned())
}

/// Σ quantity × price, rounded to cents. Lines whose product is gone count as zero.
fn cart_total(items: &[CartItemResponse]) -> f64 {
    let total: f64 = items
        .iter()
        .filter_map(|item| {
            item.product
                .as_ref()
                .map(|product| f64::from(item.quantity) * product.price)
        })
        .sum();
    (total * 100.0).round() / 100.0
}

//Structs
fn one() -> i32 {
    1
}

#[derive(Deserialize, Debug, Validate)]
struct AddProduct {
    product_id: i32,
    #[serde(default = "one")]
    #[validate(range(min = 1))]
    quantity: i32,
}

#[derive(Deserialize, Validate)]
struct PatchCart {
    #[validate(range(min = 0))]
    quantity: i32,
}

#[derive(Serialize, Debug)]
struct CartItemResponse {
    id: i32,
    product_id: i32,
    quantity: i32,
    product: Option<CartProduct>,
}

#[derive(Serialize, Debug)]
struct CartProduct {
    id: i32,
    name: String,
    image: Option<String>,
    stock: i32,
    price: f64,
}

impl CartItemResponse {
    fn new(entry: cart::Model, product: Option<product::Model>) -> CartItemResponse {
        CartItemResponse {
            id: entry.id,
            product_id: entry.product_id,
            quantity: entry.quantity,
            product: product.map(|p| CartProduct {
                id: p.id,
                name: p.name,
                image: p.image,
                stock: p.stock,
                price: p.price,
            }),
        }
    }
}
