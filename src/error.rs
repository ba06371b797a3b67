// Error handling module
// Client-side error kinds and gateway HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors from authenticated calls to the protected API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// No valid session after one refresh-and-retry attempt
    #[error("Unauthorized")]
    Unauthorized,

    /// Any other non-2xx response
    #[error("{message}")]
    Api { status: u16, message: String },

    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// A 2xx response whose body did not match the expected shape
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether a data fetch may be attempted again after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::Unauthorized)
    }
}

/// Errors returned by the gateway's own endpoints
#[derive(Error, Debug)]
pub enum ApiError {
    /// No session
    #[error("Unauthorized")]
    Unauthorized,

    /// Error from the protected API
    #[error("Upstream API error: {status} - {message}")]
    Upstream { status: u16, message: String },

    /// Request validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unauthorized => ApiError::Unauthorized,
            ClientError::Api { status, message } => ApiError::Upstream { status, message },
            ClientError::Network(msg) => ApiError::Upstream {
                status: 502,
                message: msg,
            },
            ClientError::Decode(msg) => ApiError::Upstream {
                status: 502,
                message: msg,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
            ),
            ApiError::Upstream { status, message } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                (status_code, "upstream_error", message)
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg),
            ApiError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type alias for gateway handlers
pub type Result<T> = std::result::Result<T, ApiError>;
