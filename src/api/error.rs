//! Error type returned by every handler

use crate::ai::{AiError, ProviderError};
use crate::db::DatabaseError;
use crate::security::{CryptoError, PasswordError, TokenError, TwoFactorError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    /// 401 for an idle session, with a machine readable code
    SessionTimeout,
    Forbidden(String),
    /// 403 from a permission check
    Denied { detail: String },
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
    ServiceUnavailable(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    /// Log the cause and hide it from the client
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, err);
        ApiError::Internal(context.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::NotFound(msg),
            DatabaseError::Conflict(msg) => ApiError::Conflict(msg),
            DatabaseError::QueryError(msg) => ApiError::BadRequest(msg),
            other => ApiError::internal("Database error", other),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort => ApiError::BadRequest(err.to_string()),
            other => ApiError::internal("Password processing failed", other),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encode(msg) => ApiError::internal("Failed to issue token", msg),
            TokenError::Expired | TokenError::Invalid(_) => {
                ApiError::Unauthorized("Invalid token".to_string())
            }
        }
    }
}

impl From<TwoFactorError> for ApiError {
    fn from(err: TwoFactorError) -> Self {
        ApiError::internal("Two-factor processing failed", err)
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        ApiError::internal("Encryption failed", err)
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::AuthError(msg) => {
                ApiError::BadRequest(format!("AI provider rejected the key: {}", msg))
            }
            other => {
                tracing::error!("AI provider error: {}", other);
                ApiError::ServiceUnavailable(format!("AI provider error: {}", other))
            }
        }
    }
}

impl From<AiError> for ApiError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::NotConfigured => ApiError::BadRequest(err.to_string()),
            AiError::Provider(e) => e.into(),
            AiError::Database(e) => e.into(),
            AiError::Parse(msg) => {
                tracing::warn!("Unusable AI output: {}", msg);
                ApiError::ServiceUnavailable("AI returned an unusable response".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            ApiError::SessionTimeout => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Session expired", "code": "SESSION_TIMEOUT" }),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::Denied { detail } => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Forbidden", "detail": detail }),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": msg })),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": msg }))
            }
        };

        (status, Json(body)).into_response()
    }
}
