//! Error types for the incentive server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use incentive_core::{DefinitionError, RuleViolation};
use serde_json::json;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A unique key (ledger reference, promo code) is already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rule violation: {0}")]
    Rule(#[from] RuleViolation),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DefinitionError> for AppError {
    fn from(e: DefinitionError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

/// HTTP status for a business-rule rejection.
pub fn rule_status(violation: &RuleViolation) -> StatusCode {
    match violation {
        RuleViolation::UserIneligible => StatusCode::FORBIDDEN,
        RuleViolation::AlreadyEarned { .. } => StatusCode::CONFLICT,
        RuleViolation::InvalidCode => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg).into_response(),
            AppError::Rule(violation) => {
                let body = json!({
                    "error": violation.code(),
                    "message": violation.to_string(),
                });
                (rule_status(&violation), Json(body)).into_response()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
