//! Undertow Core - swarm lifecycle management for on-demand streaming
//!
//! Turns torrent and magnet sources into registered swarms, picks the file
//! worth streaming, tracks when each swarm was last used and reclaims
//! storage from idle or over-seeded swarms in the background.

pub mod access;
pub mod config;
pub mod eviction;
pub mod manager;
pub mod resolver;
pub mod selector;
pub mod swarm;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use access::AccessTracker;
pub use config::{ConfigError, UndertowConfig};
pub use eviction::{EvictionEngine, EvictionPolicy, EvictionReason, SweepReport};
pub use manager::{AddSourceRequest, ManagerError, StreamTicket, SwarmManager};
pub use resolver::{ResolveError, SourceResolver};
pub use selector::{EpisodeHint, SelectionError};
pub use swarm::{InfoHash, SwarmEngine, SwarmError};

/// Core errors that can bubble up from any Undertow subsystem.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("Request failed: {0}")]
    Manager(#[from] ManagerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {reason}")]
    Server { reason: String },
}

impl UndertowError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::Config(ConfigError::MissingVariable { name }) => {
                format!("Missing required environment variable: {name}")
            }
            UndertowError::Config(e) => format!("Invalid configuration: {e}"),
            UndertowError::Swarm(_) => "Download engine error occurred".to_string(),
            UndertowError::Manager(e) => match e {
                ManagerError::MetadataTimeout { .. } => {
                    "Timed out waiting for torrent metadata".to_string()
                }
                ManagerError::Selection(_) => "No suitable video file found".to_string(),
                ManagerError::Resolve(e) => format!("Failed to resolve source: {e}"),
                _ => "Streaming request failed".to_string(),
            },
            UndertowError::Io(_) => "File system error occurred".to_string(),
            UndertowError::Server { reason } => format!("Server error: {reason}"),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            UndertowError::Config(_)
                | UndertowError::Manager(ManagerError::Selection(_))
                | UndertowError::Manager(ManagerError::FileIndexOutOfRange { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_variable_user_message() {
        let error = UndertowError::from(ConfigError::MissingVariable {
            name: "TMDB_API_KEY".to_string(),
        });

        assert!(error.is_user_error());
        assert_eq!(
            error.user_message(),
            "Missing required environment variable: TMDB_API_KEY"
        );
    }

    #[test]
    fn test_server_error_is_not_user_error() {
        let error = UndertowError::Server {
            reason: "bind failed".to_string(),
        };
        assert!(!error.is_user_error());
        assert!(error.user_message().contains("bind failed"));
    }
}
