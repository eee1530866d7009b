//! Undertow Search - catalog metadata and release discovery
//!
//! Thin clients for the two upstream services the player UI browses before
//! a stream starts: a TMDB-style catalog for movie and show metadata, and a
//! Prowlarr-style indexer for releases of a given title.

pub mod catalog;
pub mod errors;
pub mod indexer;

// Re-export main types
pub use catalog::{CatalogClient, CatalogResponse, CatalogSearch};
pub use errors::MediaSearchError;
pub use indexer::{IndexerClient, IndexerParams, IndexerQuery, IndexerResult, ReleaseParser};

/// Convenience type alias for Results with MediaSearchError.
pub type Result<T> = std::result::Result<T, MediaSearchError>;
