use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::api::begin;
use crate::entities::{
    hash_password,
    user::{self, Entity as UserEntity, Role},
};
use crate::middleware::{
    auth::{generate_token, TokenSettings},
    logging::{ApiError, AppJson},
};

pub fn auth_router() -> Router {
    Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login))
}

async fn register_user(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(tokens): Extension<Arc<TokenSettings>>,
    AppJson(payload): AppJson<RegisterUser>,
) -> Result<Response, ApiError> {
    payload.validate()?;
    let email = normalize_email(&payload.email);

    let txn = begin(&db).await?;

    let existing = UserEntity::find()
        .filter(user::Column::Email.eq(email.as_str()))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("User already exists".to_owned()));
    }

    let password = hash_password(&payload.password).map_err(ApiError::PasswordHashFailed)?;

    let created = user::ActiveModel {
        first_name: Set(payload.first_name.trim().to_owned()),
        last_name: Set(payload.last_name.trim().to_owned()),
        email: Set(email),
        password: Set(password),
        role: Set(Role::Customer),
        phone: Set(payload.phone),
        address: Set(payload.address),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    let token = generate_token(&tokens, created.id, created.role)
        .map_err(|err| ApiError::TokenGenerationFailed(err.to_string()))?;

    info!(user_id = created.id, "Registered new customer");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User created successfully",
            "token": token,
            "user": UserResponse::from(created),
        })),
    )
        .into_response())
}

async fn login(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(tokens): Extension<Arc<TokenSettings>>,
    AppJson(payload): AppJson<UserLogin>,
) -> Result<Response, ApiError> {
    payload.validate()?;

    let found = UserEntity::find()
        .filter(user::Column::Email.eq(normalize_email(&payload.email)))
        .one(db.as_ref())
        .await?;

    let Some(model) = found else {
        return Err(invalid_credentials());
    };
    if model.check_hash(&payload.password).is_err() {
        return Err(invalid_credentials());
    }

    let token = generate_token(&tokens, model.id, model.role)
        .map_err(|err| ApiError::TokenGenerationFailed(err.to_string()))?;

    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": UserResponse::from(model),
    }))
    .into_response())
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("Invalid credentials".to_owned())
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Deserialize, Validate)]
struct RegisterUser {
    #[validate(length(min = 1, max = 100))]
    first_name: String,
    #[validate(length(min = 1, max = 100))]
    last_name: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 6))]
    password: String,
    #[validate(length(max = 30))]
    phone: Option<String>,
    address: Option<String>,
}

#[derive(Deserialize, Validate)]
struct UserLogin {
    #[validate(length(min = 1))]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

/// A user as shown to clients; never carries the password hash.
#[derive(Serialize, Debug, Clone)]
pub struct UserResponse {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(value: user::Model) -> Self {
        UserResponse {
            id: value.id,
            first_name: value.first_name,
            last_name: value.last_name,
            email: value.email,
            role: value.role,
            phone: value.phone,
            address: value.address,
            created_at: value.created_at,
        }
    }
}
