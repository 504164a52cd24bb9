use crate::entities::user::{self, Entity as UserEntity, Role};
use crate::middleware::logging::{to_response, ApiError};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{str::FromStr, sync::Arc};
use thiserror::Error;

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized(AuthMiddlewareError::MissingToken);
    };

    match validate_token(&state.db, &state.tokens, token, state.role).await {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(AuthMiddlewareError::Forbidden) => to_response(
            (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "Insufficient permissions"
                })),
            ),
            Err(ApiError::Forbidden(AuthMiddlewareError::Forbidden.to_string())),
        ),
        Err(AuthMiddlewareError::InternalServerError(err)) => {
            ApiError::DbError(err).into_response()
        }
        Err(err) => unauthorized(err),
    }
}

fn unauthorized(err: AuthMiddlewareError) -> Response {
    to_response(
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "Unauthorized"
            })),
        ),
        Err(ApiError::Unauthorized(err.to_string())),
    )
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub role: String,
    pub exp: usize,
}

#[derive(Clone, Debug)]
pub struct TokenSettings {
    pub secret: String,
    pub ttl_hours: i64,
}

#[derive(Clone, Debug)]
pub struct AuthState {
    pub db: Arc<DatabaseConnection>,
    pub tokens: Arc<TokenSettings>,
    pub role: Role,
}

pub fn generate_token(
    settings: &TokenSettings,
    user_id: i32,
    role: Role,
) -> Result<String, AuthMiddlewareError> {
    let exp = Utc::now()
        .checked_add_signed(Duration::hours(settings.ttl_hours))
        .ok_or(AuthMiddlewareError::GenerationFail)?
        .timestamp() as usize;

    let claims = Claims {
        user_id,
        role: role.to_string(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(settings.secret.as_bytes()),
    )
    .map_err(|_| AuthMiddlewareError::GenerationFail)
}

/// Decodes the token and checks that its user still exists with the same
/// role, and that this role is allowed past `required`.
pub async fn validate_token(
    db: &DatabaseConnection,
    settings: &TokenSettings,
    token: &str,
    required: Role,
) -> Result<Claims, AuthMiddlewareError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AuthMiddlewareError::TokenExpired)?
    .claims;

    let role = Role::from_str(&claims.role).map_err(|_| AuthMiddlewareError::ValidationFail)?;

    let user = UserEntity::find_by_id(claims.user_id)
        .filter(user::Column::Role.eq(role))
        .one(db)
        .await
        .map_err(AuthMiddlewareError::InternalServerError)?;

    match user {
        Some(_) if role.permits(required) => Ok(claims),
        Some(_) => Err(AuthMiddlewareError::Forbidden),
        None => Err(AuthMiddlewareError::InvalidUserOrRole),
    }
}

#[derive(Error, Debug)]
pub enum AuthMiddlewareError {
    #[error("Missing bearer token")]
    MissingToken,
    #[error("Invalid user id or role")]
    InvalidUserOrRole,
    #[error("Role is not allowed here")]
    Forbidden,
    #[error("Token expired or malformed")]
    TokenExpired,
    #[error("Failed to validate token")]
    ValidationFail,
    #[error("Failed to generate token")]
    GenerationFail,
    #[error("Internal server error: {0}")]
    InternalServerError(sea_orm::DbErr),
}
