//! Error types for the log monitor agent.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use claw_logmon::LogMonError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur in the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The configuration push was malformed or failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pushed rule template did not compile.
    #[error("{0}")]
    InvalidPattern(String),

    /// The agent's own configuration file is unusable.
    #[error("agent configuration error: {0}")]
    AgentConfig(String),

    /// Failed to bind to the listen address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Self::InvalidConfig(_) => (StatusCode::BAD_REQUEST, "invalid_config"),
            Self::InvalidPattern(_) => (StatusCode::BAD_REQUEST, "invalid_pattern"),
            Self::AgentConfig(_) | Self::BindFailed(_, _) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

impl From<LogMonError> for AgentError {
    fn from(err: LogMonError) -> Self {
        match err {
            LogMonError::ConfigParse(message) => Self::InvalidConfig(message),
            err @ LogMonError::PatternCompile { .. } => Self::InvalidPattern(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}
