//! Error types for Hangar

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openapi_client::models::{ErrorResponse, FieldError};
use thiserror::Error;

/// Main error type for Hangar
#[derive(Error, Debug)]
pub enum HangarError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    SocketError(String),

    #[error("Validation error: {}", format_fields(.0))]
    ValidationError(Vec<FieldError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Sync error: {0}")]
    SyncError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HangarError {
    /// Single-field validation error
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        HangarError::ValidationError(vec![FieldError::new(field, message)])
    }

    /// Stable machine-readable code used in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            HangarError::ValidationError(_) => "validation_error",
            HangarError::NotFound(_) => "not_found",
            HangarError::InvalidTransition(_) => "invalid_transition",
            _ => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            HangarError::ValidationError(_) | HangarError::InvalidTransition(_) => {
                StatusCode::BAD_REQUEST
            }
            HangarError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HangarError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            fields: match self {
                HangarError::ValidationError(fields) => fields,
                _ => Vec::new(),
            },
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for HangarError {
    fn from(err: anyhow::Error) -> Self {
        HangarError::Internal(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HangarError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        HangarError::SocketError(err.to_string())
    }
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}
