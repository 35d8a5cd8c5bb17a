use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// ApiError
///
/// The error taxonomy surfaced by every handler and extractor. Each variant maps to one
/// HTTP status and a stable machine-readable `code` in the [`ErrorResponse`] body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Input that is well-formed but rejected by a business rule
    /// (password complexity, wrong current password).
    #[error("{0}")]
    InvalidInput(String),

    /// Malformed payloads and field constraint violations.
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    #[error("{0}")]
    Conflict(String),

    /// Missing/invalid token, or bad login credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// The principal exists but its account is deactivated.
    #[error("Inactive user")]
    Inactive,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Too many requests. Please try again later.")]
    RateLimited { retry_after: u64 },

    /// Store or infrastructure failure. The message is generic; the cause is logged.
    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Inactive => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::Validation { .. } => "VALIDATION_FAILED",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Inactive => "INACTIVE_USER",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Internal => "INTERNAL",
        }
    }

    pub fn unauthorized() -> Self {
        ApiError::Unauthorized("Could not validate credentials".to_string())
    }
}

/// ErrorResponse
///
/// The JSON body of every error response.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "Post not found" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            details: match &self {
                ApiError::Validation { details, .. } => details.clone(),
                _ => None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl ApiError {
    /// An extractor rejection, carrying axum's own explanation as `details`.
    fn rejected(body_text: String) -> Self {
        ApiError::Validation {
            message: "Validation failed".to_string(),
            details: Some(Value::String(body_text)),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::rejected(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::rejected(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::rejected(rejection.body_text())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    serde_json::json!({
                        "field": field,
                        "message": e
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string()),
                        "type": e.code,
                    })
                })
            })
            .collect::<Vec<_>>();

        ApiError::Validation {
            message: "Validation failed".to_string(),
            details: Some(Value::Array(details)),
        }
    }
}

/// RepositoryError
///
/// Failures raised by the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// A unique constraint was violated (duplicate email).
    #[error("unique constraint violated")]
    Conflict,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict => ApiError::Conflict("Email already registered".to_string()),
            RepositoryError::Database(e) => {
                tracing::error!(error = ?e, "repository failure");
                ApiError::Internal
            }
        }
    }
}

/// Handler result alias.
pub type ApiResult<T> = Result<T, ApiError>;
