//! Service error taxonomy and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::detector::DetectorError;

#[derive(Debug, Error)]
pub enum WakeError {
    /// Invalid or missing credential / keyword configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid sessionId: {0}")]
    SessionNotFound(String),

    #[error("{0} required")]
    MissingParameter(&'static str),

    /// The detector failed mid-stream. Only the current request fails.
    #[error("detector process error")]
    DetectorProcess(#[source] DetectorError),

    #[error("service is shutting down")]
    ShuttingDown,
}

impl WakeError {
    pub fn status(&self) -> StatusCode {
        match self {
            WakeError::Configuration(_) | WakeError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            WakeError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            WakeError::DetectorProcess(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WakeError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<wakeconf::ConfigError> for WakeError {
    fn from(e: wakeconf::ConfigError) -> Self {
        WakeError::Configuration(e.to_string())
    }
}

impl From<DetectorError> for WakeError {
    fn from(e: DetectorError) -> Self {
        match e {
            // A backend that refuses to start is a configuration problem
            // (bad access key, unknown keyword, unreadable model file).
            DetectorError::Init(message) => WakeError::Configuration(message),
            other => WakeError::DetectorProcess(other),
        }
    }
}

impl IntoResponse for WakeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            WakeError::DetectorProcess(source) => serde_json::json!({
                "error": self.to_string(),
                "detail": source.to_string(),
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}
