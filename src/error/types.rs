//! Gateway error types
//!
//! Every failure the gateway itself originates is rendered as
//! `{"error": ..., "message": ...}`. Upstream provider errors never pass
//! through this type; they are returned to the caller verbatim.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Bad or missing credentials, or an inactive tenant. The message never
    /// says which of those it was.
    #[error("Invalid client credentials")]
    Unauthorized,

    #[error("Usage limit exceeded: {0}")]
    UsageLimitExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::UsageLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::InvalidRequest(_)
            | GatewayError::Upstream(_)
            | GatewayError::Storage(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            GatewayError::Unauthorized => {
                ErrorBody::new("Unauthorized", "Invalid client credentials")
            }
            GatewayError::UsageLimitExceeded(reason) => {
                ErrorBody::new("Usage limit exceeded", reason)
            }
            GatewayError::InvalidRequest(msg) => ErrorBody::new("Invalid request", msg),
            GatewayError::Upstream(msg) => ErrorBody::new("Internal server error", msg),
            GatewayError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage failure while serving request");
                ErrorBody::new("Internal server error", msg)
            }
            GatewayError::Internal(err) => {
                tracing::error!(error = %err, "Internal gateway error");
                ErrorBody::new("Internal server error", err.to_string())
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Body of every gateway-originated error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
