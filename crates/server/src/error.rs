//! Server error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mapspace_world::WorldError;
use serde_json::json;
use thiserror::Error;

use crate::provider::ProviderError;

/// Failures a handler cannot express as an operation status
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    World(#[from] WorldError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for server operations
pub type ServiceResult<T> = Result<T, ServiceError>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match &self {
            ServiceError::InvalidRequest(msg) => tracing::warn!(error = %msg, "Rejected request"),
            other => tracing::error!(error = %other, "Request failed"),
        }

        let body = Json(json!({
            "_tag": "GenericError",
            "mes": self.to_string(),
        }));

        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
