//! HTTP request handlers organized by functionality

pub mod catalog;
pub mod error;
pub mod indexer;
pub mod range;
pub mod streaming;
pub mod torrent;

// Re-export handler functions
pub use catalog::{api_episode, api_movie, api_search, api_season, api_show};
pub use error::ApiError;
pub use indexer::api_indexer;
pub use range::{RangeRequest, parse_range_header};
pub use streaming::stream_file;
pub use torrent::{api_add_torrent, api_remove_torrent, api_torrents};
