// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type shared by the state containers and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Authentication required")]
    NotAuthenticated,

    #[error("No email verification is pending")]
    NoPendingVerification,

    #[error("Email address has not been confirmed")]
    EmailNotConfirmed,

    #[error("Identity provider error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Text suitable for a transient user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotAuthenticated => "You must be logged in to do that".to_string(),
            AppError::NoPendingVerification => {
                "There is no account waiting for verification".to_string()
            }
            AppError::EmailNotConfirmed => {
                "Your account is not verified yet. Check your email or request a new code."
                    .to_string()
            }
            AppError::Auth(msg) => msg.clone(),
            AppError::NotFound(_) => "The requested item no longer exists".to_string(),
            AppError::Database(_) => "The data service could not complete the request".to_string(),
            AppError::Internal(_) => "Something went wrong".to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let detail = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{}: {}", field, detail)
            })
            .collect();
        fields.sort();
        AppError::Validation(fields.join("; "))
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
            }
            AppError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NoPendingVerification => {
                (StatusCode::CONFLICT, "no_pending_verification", None)
            }
            AppError::EmailNotConfirmed => (StatusCode::FORBIDDEN, "email_not_confirmed", None),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, "auth_error", Some(msg.clone())),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::BAD_GATEWAY, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for services and handlers
pub type Result<T> = std::result::Result<T, AppError>;
