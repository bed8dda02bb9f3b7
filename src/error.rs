use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// The session carries no authenticated user
    #[error("Not authenticated")]
    Unauthorized,

    /// Unknown user or wrong password; the two are never told apart
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Session destroy failed: {0}")]
    SessionDestroy(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorResponse {
        let (message, error) = match self {
            AppError::Unauthorized => ("not logged in".to_string(), None),
            AppError::InvalidCredentials => ("invalid creds".to_string(), None),
            AppError::Database(e) => ("problem with db".to_string(), Some(e.to_string())),
            AppError::PasswordHash(e) => ("unable to hash password".to_string(), Some(e.clone())),
            other => ("internal error".to_string(), Some(other.to_string())),
        };
        ErrorResponse { message, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        // Logout failures are reported as plain text
        if let AppError::SessionDestroy(_) = self {
            return (status, "unable to logout").into_response();
        }

        (status, Json(self.body())).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
