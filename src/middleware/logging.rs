use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::ValidationErrors;

pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let elapsed = start.elapsed();

    match response.extensions().get::<ErrorReport>() {
        Some(report) if status.is_server_error() => error!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            value = %report.0,
            "Failed to process request"
        ),
        Some(report) => warn!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            value = %report.0,
            "Rejected request"
        ),
        None => info!(
            method = %method,
            uri = %uri,
            status = %status,
            elapsed = ?elapsed,
            "Processed request"
        ),
    }

    response
}

/// Internal description of a failure, attached to the response for the
/// logging middleware. Never serialized to the client.
#[derive(Clone, Debug)]
pub struct ErrorReport(pub String);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("Failed to validate: {0}")]
    ValidationFail(#[from] ValidationErrors),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("Failed to create transaction: {0}")]
    TransactionCreationFailed(DbErr),
    #[error("Database error: {0}")]
    DbError(#[from] DbErr),
    #[error("Failed to hash password: {0}")]
    PasswordHashFailed(String),
    #[error("Failed to generate token: {0}")]
    TokenGenerationFailed(String),
    #[error("Upstream service failed: {0}")]
    Upstream(String),
    #[error("{1}")]
    Rejected(StatusCode, String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationFail(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Rejected(status, _) => *status,
            ApiError::TransactionCreationFailed(_)
            | ApiError::DbError(_)
            | ApiError::PasswordHashFailed(_)
            | ApiError::TokenGenerationFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the client is allowed to see.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(value)
            | ApiError::Unauthorized(value)
            | ApiError::Forbidden(value)
            | ApiError::NotFound(value)
            | ApiError::Conflict(value)
            | ApiError::Unavailable(value)
            | ApiError::Rejected(_, value) => value.clone(),
            ApiError::ValidationFail(errors) => validation_message(errors),
            ApiError::Upstream(_) => "Upstream service unavailable".to_owned(),
            ApiError::TransactionCreationFailed(_)
            | ApiError::DbError(_)
            | ApiError::PasswordHashFailed(_)
            | ApiError::TokenGenerationFailed(_) => "Internal server error".to_owned(),
        }
    }
}

fn validation_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .keys()
        .map(|field| field.to_string())
        .collect();
    fields.sort_unstable();
    format!("Invalid value for: {}", fields.join(", "))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

/// `Json` extractor whose rejections answer with the `{ "error": ... }` body.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        to_response(
            (self.status(), Json(json!({ "error": self.public_message() }))),
            Err(self),
        )
    }
}

pub fn to_response<T: IntoResponse>(
    response: T,               //The response that we are sending + StatusCode
    ext: Result<(), ApiError>, //Failure details for the logging middleware
) -> Response {
    let mut response = response.into_response();

    if let Err(err) = ext {
        response.extensions_mut().insert(ErrorReport(err.to_string()));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1))]
        name: String,
        #[validate(range(min = 1))]
        quantity: i32,
    }

    #[test]
    fn internal_errors_stay_opaque() {
        let err = ApiError::DbError(DbErr::Custom("connection reset".to_owned()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal server error");
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn validation_errors_name_the_fields() {
        let sample = Sample {
            name: String::new(),
            quantity: 0,
        };
        let err = ApiError::from(sample.validate().unwrap_err());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Invalid value for: name, quantity");
    }

    #[test]
    fn error_responses_carry_a_report() {
        let response = ApiError::NotFound("Order not found".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let report = response.extensions().get::<ErrorReport>().expect("report attached");
        assert_eq!(report.0, "Order not found");
    }

    #[tokio::test]
    async fn malformed_json_bodies_answer_with_an_error_body() {
        use axum::{body::Body, http::header::CONTENT_TYPE};

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request builds");

        let err = match AppJson::<serde_json::Value>::from_request(request, &()).await {
            Ok(_) => panic!("malformed body was accepted"),
            Err(err) => err,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let response = err.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body: serde_json::Value = serde_json::from_slice(&bytes).expect("body is JSON");
        assert!(body["error"].is_string());
    }
}
