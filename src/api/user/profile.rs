use axum::{
    extract::Extension,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::api::{begin, public::auth::UserResponse};
use crate::entities::{hash_password, user};
use crate::middleware::{auth::Claims, logging::{ApiError, AppJson}};

pub fn profile_router() -> Router {
    Router::new()
        .route("/auth/profile", get(get_profile).patch(patch_profile))
        .route("/auth/password", patch(change_password))
}

async fn get_profile(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Result<Response, ApiError> {
    match user::Entity::find_by_id(claims.user_id).one(db.as_ref()).await? {
        Some(model) => Ok(Json(json!({ "user": UserResponse::from(model) })).into_response()),
        None => Err(user_not_found()),
    }
}

async fn patch_profile(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<PatchProfile>,
) -> Result<Response, ApiError> {
    payload.validate()?;

    let txn = begin(&db).await?;

    let Some(model) = user::Entity::find_by_id(claims.user_id).one(&txn).await? else {
        return Err(user_not_found());
    };
    let mut model: user::ActiveModel = model.into();

    if let Some(first_name) = payload.first_name {
        model.first_name = Set(first_name.trim().to_owned());
    }
    if let Some(last_name) = payload.last_name {
        model.last_name = Set(last_name.trim().to_owned());
    }
    if let Some(phone) = payload.phone {
        model.phone = Set(Some(phone));
    }
    if let Some(address) = payload.address {
        model.address = Set(Some(address));
    }

    let updated = model.update(&txn).await?;
    txn.commit().await?;

    Ok(Json(json!({
        "message": "Profile updated successfully",
        "user": UserResponse::from(updated),
    }))
    .into_response())
}

async fn change_password(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    AppJson(payload): AppJson<ChangePassword>,
) -> Result<Response, ApiError> {
    payload.validate()?;

    let txn = begin(&db).await?;

    let Some(model) = user::Entity::find_by_id(claims.user_id).one(&txn).await? else {
        return Err(user_not_found());
    };
    if model.check_hash(&payload.current_password).is_err() {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_owned(),
        ));
    }

    let password = hash_password(&payload.new_password).map_err(ApiError::PasswordHashFailed)?;
    let mut model: user::ActiveModel = model.into();
    model.password = Set(password);
    model.update(&txn).await?;

    txn.commit().await?;

    Ok(Json(json!({ "message": "Password changed successfully" })).into_response())
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_owned())
}

#[derive(Deserialize, Validate)]
struct PatchProfile {
    #[validate(length(min = 1, max = 100))]
    first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    last_name: Option<String>,
    #[validate(length(max = 30))]
    phone: Option<String>,
    address: Option<String>,
}

#[derive(Deserialize, Validate)]
struct ChangePassword {
    #[validate(length(min = 1))]
    current_password: String,
    #[validate(length(min = 6))]
    new_password: String,
}
