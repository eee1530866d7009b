//! Metainfo and magnet link parsing.
//!
//! Metainfo is decoded with bencode-rs, magnet links are validated with
//! magnet-url. Both produce the [`InfoHash`](super::InfoHash) a swarm is keyed by.

pub mod magnet;
pub mod metainfo;

pub use magnet::{MagnetLink, MagnetParser};
pub use metainfo::{Metainfo, MetainfoFile, MetainfoParser};
