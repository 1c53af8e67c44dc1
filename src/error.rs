//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrent modification, retry the request")]
    SerializationConflict,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    // Domain errors
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::auth::AuthError> for AppError {
    fn from(err: crate::auth::AuthError) -> Self {
        match err {
            crate::auth::AuthError::InvalidToken(_) => AppError::Unauthorized(err.to_string()),
            crate::auth::AuthError::Hashing(msg) => AppError::Internal(msg),
        }
    }
}

impl From<crate::event_store::EventStoreError> for AppError {
    fn from(err: crate::event_store::EventStoreError) -> Self {
        match err {
            crate::event_store::EventStoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<crate::audit::AuditLogError> for AppError {
    fn from(err: crate::audit::AuditLogError) -> Self {
        match err {
            crate::audit::AuditLogError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<crate::ledger::LedgerError> for AppError {
    fn from(err: crate::ledger::LedgerError) -> Self {
        match err {
            crate::ledger::LedgerError::Database(e) => AppError::Database(e),
            crate::ledger::LedgerError::Domain(e) => AppError::Domain(e),
            crate::ledger::LedgerError::AccountNotFound(id) => {
                AppError::NotFound(format!("Account {}", id))
            }
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// HTTP status, machine-readable code and optional details
    fn parts(&self) -> (StatusCode, &'static str, Option<String>) {
        match self {
            // 401 Unauthorized
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", None),

            // 403 Forbidden
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", Some(msg.clone())),

            // 404 Not Found
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, "not_found", Some(what.clone())),

            // 409 Conflict
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::SerializationConflict => {
                (StatusCode::CONFLICT, "serialization_conflict", None)
            }

            // 429 Too Many Requests
            AppError::RateLimitExceeded => {
                (StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", None)
            }

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => {
                use crate::domain::DomainError;
                match domain_err {
                    DomainError::InsufficientFunds { .. } => (
                        StatusCode::BAD_REQUEST,
                        "insufficient_funds",
                        Some(domain_err.to_string()),
                    ),
                    DomainError::InvalidAmount(msg) => {
                        (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
                    }
                    DomainError::Validation(msg) => {
                        (StatusCode::BAD_REQUEST, "validation_failed", Some(msg.clone()))
                    }
                    DomainError::InvalidValue(msg) => {
                        tracing::error!("Invalid stored value: {}", msg);
                        (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                    }
                    DomainError::UserNotFound(id) => {
                        (StatusCode::NOT_FOUND, "user_not_found", Some(id.clone()))
                    }
                    DomainError::AccountNotFound(id) => {
                        (StatusCode::NOT_FOUND, "account_not_found", Some(id.clone()))
                    }
                    DomainError::DeviceNotFound(id) => {
                        (StatusCode::NOT_FOUND, "device_not_found", Some(id.clone()))
                    }
                    DomainError::DeviceNotVerified => {
                        (StatusCode::FORBIDDEN, "device_not_verified", None)
                    }
                    DomainError::AlreadyExists(what) => {
                        (StatusCode::CONFLICT, "already_exists", Some(what.clone()))
                    }
                }
            }

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        }
    }

    /// Status code this error maps to
    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = self.parts();

        // Server-side failures never echo internals to the client
        let error = if status.is_server_error() {
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use rust_decimal::Decimal;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Domain(DomainError::DeviceNotVerified).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Domain(DomainError::AlreadyExists("User".into())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Domain(DomainError::insufficient_funds(
                Decimal::new(10, 0),
                Decimal::ZERO
            ))
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_hidden() {
        let response = AppError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
