//! Error types for the form server

use acroform_core::FormError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Template unreadable: {0}")]
    TemplateUnreadable(String),

    #[error("Failed to serialize filled document: {0}")]
    Serialization(String),

    #[error("No field map configured")]
    NoFieldMap,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::TemplateUnreadable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TEMPLATE_UNREADABLE")
            }
            ServerError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_FAILED")
            }
            ServerError::NoFieldMap => (StatusCode::NOT_FOUND, "NO_FIELD_MAP"),
            ServerError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<FormError> for ServerError {
    fn from(err: FormError) -> Self {
        match err {
            FormError::Serialization(msg) => ServerError::Serialization(msg),
            FormError::Unreadable(_) | FormError::Malformed(_) | FormError::Io(_) => {
                ServerError::TemplateUnreadable(err.to_string())
            }
            FormError::Json(e) => ServerError::Internal(e.to_string()),
        }
    }
}
