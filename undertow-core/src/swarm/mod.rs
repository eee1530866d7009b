//! Swarm engine adapter seam and the types shared across it.
//!
//! The engine that talks to peers, assembles pieces and writes data to disk
//! lives behind [`SwarmEngine`]. Everything else in Undertow only ever holds
//! an [`InfoHash`] and asks the engine for fresh state when it needs it.

pub mod parsing;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Serialize, Serializer};
use tokio::io::{AsyncRead, AsyncSeek};

pub use parsing::{MagnetLink, MagnetParser, Metainfo, MetainfoFile, MetainfoParser};

/// SHA-1 hash identifying a unique swarm.
///
/// 20-byte SHA-1 hash of the info dictionary. Rendered as 40 lowercase hex
/// characters in URLs and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parses a 40 character hex string, case-insensitive.
    ///
    /// # Errors
    /// - `SwarmError::InvalidInfoHash` - Wrong length or non-hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self, SwarmError> {
        if hex_str.len() != 40 {
            return Err(SwarmError::InvalidInfoHash {
                reason: format!("expected 40 hex characters, got {}", hex_str.len()),
            });
        }

        let mut hash = [0u8; 20];
        hex::decode_to_slice(hex_str, &mut hash).map_err(|e| SwarmError::InvalidInfoHash {
            reason: e.to_string(),
        })?;
        Ok(Self(hash))
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for InfoHash {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Transfer priority of a single file inside a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilePriority {
    /// Not downloaded at all
    None,
    /// Downloaded in regular piece order
    #[default]
    Normal,
    /// Preferred over normal files
    High,
    /// Needed for playback right now
    Now,
}

/// One entry of a swarm's file list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwarmFile {
    pub index: usize,
    /// Display path with components joined by `/`
    pub path: String,
    pub length: u64,
    pub priority: FilePriority,
}

impl SwarmFile {
    /// Last path component, used as the file name shown to clients.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Cumulative byte counters for one swarm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwarmStats {
    pub bytes_downloaded: u64,
    pub bytes_uploaded: u64,
    /// Bytes of verified content currently held on disk
    pub bytes_completed: u64,
}

impl SwarmStats {
    /// Upload to download ratio, zero when nothing has been downloaded.
    pub fn ratio(&self) -> f64 {
        if self.bytes_downloaded == 0 {
            return 0.0;
        }
        self.bytes_uploaded as f64 / self.bytes_downloaded as f64
    }
}

/// How a file stream should drive the underlying piece scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Fetch pieces in playback order
    pub sequential: bool,
    /// Bytes to keep fetching ahead of the read position
    pub readahead: u64,
}

/// Seekable byte stream over one file of a swarm.
pub trait SwarmReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> SwarmReader for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

pub type BoxedReader = Box<dyn SwarmReader>;

/// Errors reported by a swarm engine.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Swarm {info_hash} not found")]
    NotFound { info_hash: InfoHash },

    #[error("Metadata for swarm {info_hash} is not available yet")]
    MetadataPending { info_hash: InfoHash },

    #[error("File index {index} out of range ({file_count} files)")]
    FileIndexOutOfRange { index: usize, file_count: usize },

    #[error("Invalid info hash: {reason}")]
    InvalidInfoHash { reason: String },

    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("Invalid metainfo: {reason}")]
    InvalidMetainfo { reason: String },

    #[error("Engine failure: {reason}")]
    Engine { reason: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Operations Undertow needs from the engine that runs the actual swarms.
///
/// Implementations must be safe to call from many tasks at once; the
/// engine's registry is the only authority on which swarms exist.
#[async_trait]
pub trait SwarmEngine: Send + Sync + 'static {
    /// Registers a swarm from a magnet URI. Adding content that is already
    /// registered returns the existing swarm's hash.
    ///
    /// # Errors
    /// - `SwarmError::InvalidMagnet` - URI could not be understood
    async fn add_magnet(&self, uri: &str) -> Result<InfoHash, SwarmError>;

    /// Registers a swarm from bencoded metainfo. Metadata is available
    /// immediately for swarms added this way.
    ///
    /// # Errors
    /// - `SwarmError::InvalidMetainfo` - Bytes are not valid metainfo
    async fn add_metainfo(&self, metainfo: &[u8]) -> Result<InfoHash, SwarmError>;

    /// Appends announce URLs to a registered swarm.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered
    async fn add_trackers(&self, info_hash: InfoHash, trackers: &[String])
    -> Result<(), SwarmError>;

    /// Resolves once the swarm's file list is known. Does not time out on
    /// its own; callers bound it.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered or was dropped while waiting
    async fn wait_for_metadata(&self, info_hash: InfoHash) -> Result<(), SwarmError>;

    /// Display name, `None` until metadata is known.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered
    async fn name(&self, info_hash: InfoHash) -> Result<Option<String>, SwarmError>;

    /// Ordered file list of the swarm.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered
    /// - `SwarmError::MetadataPending` - File list is not known yet
    async fn files(&self, info_hash: InfoHash) -> Result<Vec<SwarmFile>, SwarmError>;

    /// Changes the transfer priority of one file.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered
    /// - `SwarmError::FileIndexOutOfRange` - No file with that index
    async fn set_priority(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        priority: FilePriority,
    ) -> Result<(), SwarmError>;

    /// Opens a seekable reader over one file. Dropping the reader releases
    /// it without affecting the swarm.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered
    /// - `SwarmError::FileIndexOutOfRange` - No file with that index
    async fn open_stream(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        options: StreamOptions,
    ) -> Result<BoxedReader, SwarmError>;

    /// Removes the swarm and releases its resources.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered
    /// - `SwarmError::Engine` - Engine refused or failed to drop it
    async fn drop_swarm(&self, info_hash: InfoHash) -> Result<(), SwarmError>;

    /// Current byte counters of the swarm.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered
    async fn stats(&self, info_hash: InfoHash) -> Result<SwarmStats, SwarmError>;

    /// Every swarm currently registered.
    async fn swarms(&self) -> Vec<InfoHash>;
}
