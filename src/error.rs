/// Unified error types for Tollgate
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::wire::ErrorCode;

/// Why a refresh token was not redeemed.
///
/// Logged with its specific value; callers on either transport only ever see
/// a uniform rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotFound,
    Expired,
    AlreadyUsed,
    Revoked,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotFound => "not-found",
            RejectReason::Expired => "expired",
            RejectReason::AlreadyUsed => "already-used",
            RejectReason::Revoked => "revoked",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing or malformed token or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Identity verification or access-token validation failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Refresh token rejected by the ledger
    #[error("Refresh token rejected: {0}")]
    Refresh(RejectReason),

    /// Identity provider unreachable or timed out
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// JWT encoding errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Code reported in a session protocol `ErrorInfo`
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            AuthError::InvalidInput(_) => ErrorCode::InvalidArgument,
            AuthError::Unauthorized(_)
            | AuthError::Refresh(_)
            | AuthError::Upstream(_)
            | AuthError::NotFound(_) => ErrorCode::Unauthorized,
            _ => ErrorCode::Internal,
        }
    }

    /// Message that is safe to send to a client.
    ///
    /// Never says which token check failed, never carries upstream or
    /// database detail.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InvalidInput(msg) => msg.clone(),
            AuthError::Unauthorized(_) | AuthError::Upstream(_) | AuthError::NotFound(_) => {
                "Invalid token".to_string()
            }
            AuthError::Refresh(_) => "Invalid refresh token".to_string(),
            AuthError::RateLimited => "Rate limit exceeded".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// Gateway error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: String,
    pub message: String,
}

/// Convert AuthError to HTTP response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            AuthError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
            AuthError::Unauthorized(_) | AuthError::Upstream(_) | AuthError::Refresh(_) => {
                (StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            // Unknown accounts on refresh look exactly like a bad token
            AuthError::NotFound(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AuthError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "RateLimitExceeded"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            ok: false,
            error: error_code.to_string(),
            message: self.public_message(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type AuthResult<T> = Result<T, AuthError>;
