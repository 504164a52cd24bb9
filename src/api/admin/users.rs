use axum::{
    extract::{Extension, Path, Query},
    response::{IntoResponse, Response},
    routing::{delete, get, patch},
    Json, Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::Deserialize;
use serde_json::json;
use std::{str::FromStr, sync::Arc};
use tracing::info;

use crate::api::{begin, page_offset, public::auth::UserResponse};
use crate::entities::{
    cart, order, order_item,
    user::{self, Entity as UserEntity, Role},
};
use crate::middleware::{auth::Claims, logging::{ApiError, AppJson}};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

//ROUTERS
pub fn admin_user_router() -> Router {
    Router::new()
        .route("/users", get(get_users))
        .route("/users/:id/role", patch(patch_role))
        .route("/users/:id", delete(delete_user))
}

//ROUTES
async fn get_users(
    Query(params): Query<UsersQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Result<Response, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = page_offset(page, limit)?;

    let total = UserEntity::find().count(db.as_ref()).await?;
    let users: Vec<UserResponse> = UserEntity::find()
        .order_by_desc(user::Column::CreatedAt)
        .order_by_desc(user::Column::Id)
        .limit(limit)
        .offset(offset)
        .all(db.as_ref())
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(json!({
        "users": users,
        "total_pages": total.div_ceil(limit),
        "current_page": page,
        "total_users": total,
    }))
    .into_response())
}

async fn patch_role(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<PatchRole>,
) -> Result<Response, ApiError> {
    let role = Role::from_str(&payload.role)
        .map_err(|_| ApiError::BadRequest("Invalid role".to_owned()))?;

    let txn = begin(&db).await?;

    let Some(existing) = UserEntity::find_by_id(id).one(&txn).await? else {
        return Err(user_not_found());
    };
    let mut model: user::ActiveModel = existing.into();
    model.role = Set(role);
    let updated = model.update(&txn).await?;

    txn.commit().await?;
    info!(user_id = id, admin_id = claims.user_id, role = %role, "User role changed");

    Ok(Json(json!({
        "message": "User role updated successfully",
        "user": UserResponse::from(updated),
    }))
    .into_response())
}

async fn delete_user(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    if id == claims.user_id {
        return Err(ApiError::BadRequest(
            "You cannot delete your own account".to_owned(),
        ));
    }

    let txn = begin(&db).await?;

    if UserEntity::find_by_id(id).one(&txn).await?.is_none() {
        return Err(user_not_found());
    }
    purge_user(&txn, id).await?;

    txn.commit().await?;
    info!(user_id = id, admin_id = claims.user_id, "User deleted");

    Ok(Json(json!({ "message": "User deleted successfully" })).into_response())
}

/// Cart lines, then order lines, then orders, then the user row.
async fn purge_user<C: ConnectionTrait>(conn: &C, user_id: i32) -> Result<(), DbErr> {
    cart::Entity::delete_many()
        .filter(cart::Column::UserId.eq(user_id))
        .exec(conn)
        .await?;

    let order_ids: Vec<i32> = order::Entity::find()
        .filter(order::Column::UserId.eq(user_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|order| order.id)
        .collect();

    if !order_ids.is_empty() {
        order_item::Entity::delete_many()
            .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
            .exec(conn)
            .await?;
        order::Entity::delete_many()
            .filter(order::Column::Id.is_in(order_ids))
            .exec(conn)
            .await?;
    }

    UserEntity::delete_by_id(user_id).exec(conn).await?;
    Ok(())
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_owned())
}

//Structs
#[derive(Deserialize)]
struct UsersQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

#[derive(Deserialize)]
struct PatchRole {
    role: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::testing::{
        insert_cart_line, insert_category, insert_product, insert_user, memory_db,
    };
    use crate::services::checkout::place_order;

    #[tokio::test]
    async fn purge_removes_everything_the_user_owns() {
        let db = memory_db().await;
        let buyer = insert_user(&db, "buyer@example.com").await;
        let other = insert_user(&db, "other@example.com").await;
        let category = insert_category(&db, "Mates").await;
        let product = insert_product(&db, category.id, "Calabaza", 10.0, 5).await;

        insert_cart_line(&db, buyer.id, product.id, 1).await;
        place_order(&db, buyer.id, "Calle 1").await.unwrap();
        insert_cart_line(&db, buyer.id, product.id, 2).await;
        insert_cart_line(&db, other.id, product.id, 1).await;

        purge_user(&db, buyer.id).await.unwrap();

        assert!(UserEntity::find_by_id(buyer.id).one(&db).await.unwrap().is_none());
        assert_eq!(order::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(order_item::Entity::find().count(&db).await.unwrap(), 0);
        let remaining = cart::Entity::find().all(&db).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, other.id);
    }
}
