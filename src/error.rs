//! Error types for the LMS server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Fixed outcome codes returned to clients alongside every response.
///
/// Clients branch on the numeric code, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    UserNotFound = 4,
    BookNotFound = 5,
    StoreUnavailable = 6,
    NoAvailableCopies = 7,
    DuplicateHandle = 8,
    BadCredentials = 9,
    BadOldPassword = 10,
    MaxLoansReached = 11,
    AlreadyBorrowed = 12,
    NoActiveLoan = 13,
    RenewFailed = 14,
    AlreadyReserved = 15,
    NoPendingReservation = 16,
    DuplicateIsbn = 17,
    BadValue = 18,
    HasActiveLoans = 19,
    BarcodeFailed = 20,
    Forbidden = 21,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {1}")]
    Authentication(ErrorCode, String),

    /// Missing, malformed, forged and expired tokens all collapse into this variant.
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {1}")]
    NotFound(ErrorCode, String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {1}")]
    Conflict(ErrorCode, String),

    #[error("Store unavailable: {0}")]
    Transient(String),

    #[error("Barcode unavailable: {0}")]
    Barcode(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn book_not_found(book_id: i32) -> Self {
        AppError::NotFound(
            ErrorCode::BookNotFound,
            format!("Book with id {} not found", book_id),
        )
    }

    pub fn user_not_found(user_id: i32) -> Self {
        AppError::NotFound(
            ErrorCode::UserNotFound,
            format!("User with id {} not found", user_id),
        )
    }

    /// The fixed outcome code this error is reported with.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Authentication(code, _)
            | AppError::NotFound(code, _)
            | AppError::Conflict(code, _) => *code,
            AppError::InvalidToken => ErrorCode::NotAuthorized,
            AppError::Authorization(_) => ErrorCode::Forbidden,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(e) if is_transient(e) => ErrorCode::StoreUnavailable,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Transient(_) => ErrorCode::StoreUnavailable,
            AppError::Barcode(_) => ErrorCode::BarcodeFailed,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// Whether the caller may safely retry the operation.
    pub fn is_transient(&self) -> bool {
        self.code() == ErrorCode::StoreUnavailable
    }
}

/// Pool exhaustion and connection loss are retryable; everything else from the driver is not.
fn is_transient(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::Authentication(_, msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::NotFound(_, msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(e) if is_transient(e) => {
                tracing::warn!("Store unavailable: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Store temporarily unavailable".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(_, msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Transient(msg) => {
                tracing::warn!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Store temporarily unavailable".to_string(),
                )
            }
            AppError::Barcode(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_transient() {
        let err = AppError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), ErrorCode::StoreUnavailable);
        assert!(err.is_transient());
        assert_eq!(
            err.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn row_not_found_is_not_transient() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.code(), ErrorCode::DbFailure);
        assert!(!err.is_transient());
    }

    #[test]
    fn conflicts_keep_their_code() {
        let err = AppError::Conflict(ErrorCode::NoAvailableCopies, "none left".into());
        assert_eq!(err.code(), ErrorCode::NoAvailableCopies);
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_token_is_unauthorized() {
        let response = AppError::InvalidToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
