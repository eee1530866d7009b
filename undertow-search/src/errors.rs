//! Error types for catalog and indexer lookups.

use thiserror::Error;

/// Errors that can occur while talking to the catalog or the indexer.
#[derive(Debug, Error)]
pub enum MediaSearchError {
    /// Upstream could not be reached or the transfer failed.
    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    /// Failed to decode an upstream response.
    #[error("Parse error: {reason}")]
    ParseError { reason: String },

    /// A required request parameter was absent or empty.
    #[error("Missing required parameter: {name}")]
    MissingParameter {
        /// Name of the missing parameter
        name: &'static str,
    },

    /// A request parameter had a value that cannot be used.
    #[error("Invalid value for {name}: {value}")]
    InvalidParameter {
        /// Name of the parameter
        name: &'static str,
        /// The rejected value
        value: String,
    },

    /// `type` was neither `movie` nor `episode`.
    #[error("Invalid media type: {media_type}")]
    InvalidMediaType { media_type: String },
}

impl MediaSearchError {
    /// True when the caller sent a bad request rather than an upstream failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MediaSearchError::MissingParameter { .. }
                | MediaSearchError::InvalidParameter { .. }
                | MediaSearchError::InvalidMediaType { .. }
        )
    }
}

impl From<reqwest::Error> for MediaSearchError {
    fn from(error: reqwest::Error) -> Self {
        MediaSearchError::NetworkError {
            reason: error.to_string(),
        }
    }
}
