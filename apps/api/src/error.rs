//! Error handling for the PlayCo API
//!
//! A single error type for the REST surface, built with thiserror and mapped
//! to HTTP status codes through Axum's IntoResponse trait. Realtime events
//! report failures through response payloads instead (see
//! `websocket::messages::SubCode`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::{NonceError, SessionIdError};
use crate::repositories::StoreError;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Main API error type
#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Authentication ==========
    /// Missing bearer credentials
    #[error("authentication required")]
    Unauthorized,

    /// Invalid bearer token (expired, malformed, wrong audience)
    #[error("invalid authentication token: {0}")]
    InvalidToken(String),

    // ========== Resource Errors ==========
    /// Requested resource not found
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    // ========== Validation Errors ==========
    /// CSRF nonce rejected at token issuance
    #[error("invalid csrf nonce: {0}")]
    InvalidNonce(#[from] NonceError),

    /// Session id failed validation
    #[error("invalid sid: {0}")]
    InvalidSessionId(#[from] SessionIdError),

    /// Invalid request body format
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    // ========== Conflicts ==========
    /// A later issuance for the same session already replaced this one
    #[error("handshake token for session {0} was superseded by a later issuance")]
    TokenSuperseded(String),

    // ========== Storage ==========
    /// Token store operation failed
    #[error("token store error: {0}")]
    Store(#[from] StoreError),

    // ========== Internal Errors ==========
    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),

    /// JWT encoding error
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized
            Self::Unauthorized | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,

            // 404 Not Found
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            // 400 Bad Request
            Self::InvalidNonce(_)
            | Self::InvalidSessionId(_)
            | Self::InvalidBody(_)
            | Self::MissingField(_) => StatusCode::BAD_REQUEST,

            // 409 Conflict
            Self::TokenSuperseded(_) => StatusCode::CONFLICT,

            // 503 Service Unavailable
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::Internal(_) | Self::Jwt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidNonce(_) => "INVALID_NONCE",
            Self::InvalidSessionId(_) => "INVALID_SID",
            Self::InvalidBody(_) => "INVALID_BODY",
            Self::MissingField(_) => "MISSING_FIELD",
            Self::TokenSuperseded(_) => "TOKEN_SUPERSEDED",
            Self::Store(_) => "STORE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Jwt(_) => "JWT_ERROR",
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Authorization error"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        // Server-side detail stays in the logs
        let message = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let error_response = ErrorResponse {
            code: self.error_code(),
            message,
            details: None,
        };

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
