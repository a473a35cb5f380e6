use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{error, warn};

use order_intake::IntakeError;
use persistence::StoreError;
use types::errors::Classify;

use crate::models::ErrorBody;

/// Central error type for the Gateway application
///
/// Each variant maps to one HTTP status and one stable error code. Messages
/// of server-side failures are replaced before they leave the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("unknown trading pair: {0}")]
    UnknownPair(String),

    #[error("user is blocked")]
    UserBlocked,

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("email already registered: {0}")]
    EmailTaken(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    PublishFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UnknownPair(_) => "UNKNOWN_PAIR",
            AppError::UserBlocked => "USER_BLOCKED",
            AppError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            AppError::EmailTaken(_) => "EMAIL_TAKEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::PublishFailed(_) => "PUBLISH_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) | AppError::UnknownPair(_) => StatusCode::BAD_REQUEST,
            AppError::UserBlocked => StatusCode::FORBIDDEN,
            AppError::InsufficientBalance(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::EmailTaken(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::PublishFailed(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<IntakeError> for AppError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::Validation(msg) => AppError::Validation(msg),
            IntakeError::UnknownPair(code) => AppError::UnknownPair(code.to_string()),
            IntakeError::UnknownUser(_) => AppError::Unauthorized("unknown user".to_string()),
            IntakeError::UserBlocked(_) => AppError::UserBlocked,
            IntakeError::InsufficientBalance { required, available } => {
                AppError::InsufficientBalance(format!("required {required}, available {available}"))
            }
            IntakeError::PublishFailed { order_id } => AppError::PublishFailed(format!(
                "order {order_id} was accepted but could not be forwarded to matching yet"
            )),
            other if other.is_retryable() => AppError::ServiceUnavailable(other.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        if let StoreError::DuplicateEmail(email) = err {
            AppError::EmailTaken(email)
        } else if err.is_retryable() {
            AppError::ServiceUnavailable(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match &self {
            AppError::Internal(detail) => {
                error!(error = %detail, "request failed");
                "internal server error".to_string()
            }
            AppError::ServiceUnavailable(detail) => {
                warn!(error = %detail, "dependency unavailable");
                "service temporarily unavailable, retry later".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: code.to_string(), message })).into_response()
    }
}
