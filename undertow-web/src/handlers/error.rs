//! Error to status code mapping for every API route.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{debug, error, warn};
use undertow_core::ManagerError;
use undertow_search::MediaSearchError;

/// An error response: status code plus a JSON `{"error": ...}` body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ManagerError> for ApiError {
    fn from(e: ManagerError) -> Self {
        match e {
            ManagerError::Resolve(e) => {
                warn!("Source resolution failed: {}", e);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to resolve source: {e}"),
                )
            }
            ManagerError::MetadataTimeout { .. } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "Timeout waiting for torrent metadata",
            ),
            ManagerError::Cancelled { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down")
            }
            ManagerError::Selection(_) => Self::not_found("No suitable video file found"),
            ManagerError::SwarmNotFound { .. } => Self::not_found("Torrent not found"),
            ManagerError::FileIndexOutOfRange { .. } => {
                Self::not_found("File index out of bounds")
            }
            ManagerError::MetadataPending { info_hash } => {
                debug!("Stream requested before metadata of {}", info_hash);
                Self::new(StatusCode::CONFLICT, "Torrent metadata not available yet")
            }
            ManagerError::Engine(e) => {
                error!("Swarm engine failure: {}", e);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

impl From<MediaSearchError> for ApiError {
    fn from(e: MediaSearchError) -> Self {
        if e.is_client_error() {
            return Self::bad_request(e.to_string());
        }
        warn!("Upstream lookup failed: {}", e);
        Self::new(StatusCode::BAD_GATEWAY, e.to_string())
    }
}
