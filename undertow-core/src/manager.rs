//! Request-path façade over resolver, selector, access tracker and engine.
//!
//! Request handlers only talk to [`SwarmManager`]. It never keeps its own
//! list of swarms; every query goes back to the engine.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::access::AccessTracker;
use crate::config::SwarmConfig;
use crate::resolver::{ResolveError, SourceResolver};
use crate::selector::{EpisodeHint, SelectionError, select_file};
use crate::swarm::{
    BoxedReader, FilePriority, InfoHash, StreamOptions, SwarmEngine, SwarmError, SwarmFile,
    SwarmStats,
};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Timed out after {timeout:?} waiting for metadata of swarm {info_hash}")]
    MetadataTimeout {
        info_hash: InfoHash,
        timeout: Duration,
    },

    #[error("Request for swarm {info_hash} was cancelled")]
    Cancelled { info_hash: InfoHash },

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("Swarm {info_hash} not found")]
    SwarmNotFound { info_hash: InfoHash },

    #[error("File index {index} out of range ({file_count} files)")]
    FileIndexOutOfRange { index: usize, file_count: usize },

    #[error("Metadata for swarm {info_hash} has not arrived yet")]
    MetadataPending { info_hash: InfoHash },

    #[error("Swarm engine error: {0}")]
    Engine(SwarmError),
}

impl From<SwarmError> for ManagerError {
    fn from(error: SwarmError) -> Self {
        match error {
            SwarmError::NotFound { info_hash } => ManagerError::SwarmNotFound { info_hash },
            SwarmError::FileIndexOutOfRange { index, file_count } => {
                ManagerError::FileIndexOutOfRange { index, file_count }
            }
            SwarmError::MetadataPending { info_hash } => {
                ManagerError::MetadataPending { info_hash }
            }
            other => ManagerError::Engine(other),
        }
    }
}

/// A client's request to start streaming from a source.
#[derive(Debug, Clone)]
pub struct AddSourceRequest {
    pub source_url: String,
    pub hint: Option<EpisodeHint>,
}

/// Everything a client needs to start streaming the selected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamTicket {
    pub info_hash: InfoHash,
    pub file_index: usize,
    pub file_name: String,
}

impl StreamTicket {
    /// Path of the streaming endpoint for this ticket.
    pub fn stream_path(&self) -> String {
        format!("/api/stream/{}/{}", self.info_hash, self.file_index)
    }
}

/// An open reader plus the file it reads.
pub struct OpenedStream {
    pub file: SwarmFile,
    pub reader: BoxedReader,
}

/// Operator view of one registered swarm.
#[derive(Debug, Clone, Serialize)]
pub struct SwarmSummary {
    pub info_hash: InfoHash,
    pub name: Option<String>,
    pub stats: SwarmStats,
    pub ratio: f64,
    /// Seconds since the last add or stream, if a record exists
    pub idle_secs: Option<u64>,
    pub file_count: Option<usize>,
}

/// Settings the manager needs from [`SwarmConfig`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub metadata_timeout: Duration,
    pub stream_readahead: u64,
    pub default_trackers: Vec<String>,
}

impl From<&SwarmConfig> for ManagerSettings {
    fn from(config: &SwarmConfig) -> Self {
        Self {
            metadata_timeout: config.metadata_timeout,
            stream_readahead: config.stream_readahead,
            default_trackers: config.default_trackers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SwarmManager {
    engine: Arc<dyn SwarmEngine>,
    resolver: SourceResolver,
    tracker: Arc<AccessTracker>,
    settings: ManagerSettings,
    /// Add requests currently waiting on each swarm's metadata
    waiters: Arc<DashMap<InfoHash, usize>>,
}

impl SwarmManager {
    /// Creates a manager; the resolver's fetch budget is the metadata timeout.
    ///
    /// # Errors
    /// - `ResolveError::Fetch` - HTTP client could not be constructed
    pub fn new(
        engine: Arc<dyn SwarmEngine>,
        tracker: Arc<AccessTracker>,
        settings: ManagerSettings,
    ) -> Result<Self, ResolveError> {
        let resolver = SourceResolver::new(engine.clone(), settings.metadata_timeout)?;
        Ok(Self {
            engine,
            resolver,
            tracker,
            settings,
            waiters: Arc::new(DashMap::new()),
        })
    }

    pub fn engine(&self) -> &Arc<dyn SwarmEngine> {
        &self.engine
    }

    pub fn tracker(&self) -> &Arc<AccessTracker> {
        &self.tracker
    }

    /// Resolves a source, waits for metadata and selects the file to stream.
    ///
    /// A swarm whose metadata does not arrive in time, or whose request is
    /// cancelled first, is dropped before this returns. Dropping the returned
    /// future mid-wait drops the swarm as well. Either way the swarm is kept
    /// while another request for the same hash is still waiting. A swarm
    /// without a suitable file stays registered and is left to eviction.
    ///
    /// # Errors
    /// - `ManagerError::Resolve` - Source could not be fetched or registered
    /// - `ManagerError::MetadataTimeout` - Metadata did not arrive in time
    /// - `ManagerError::Cancelled` - `cancel` fired while waiting
    /// - `ManagerError::Selection` - No video file in the swarm
    pub async fn add_source(
        &self,
        request: AddSourceRequest,
        cancel: CancellationToken,
    ) -> Result<StreamTicket, ManagerError> {
        let started = tokio::time::Instant::now();
        info!(
            "Add request: {} (hint: {:?})",
            request.source_url, request.hint
        );

        let info_hash = self.resolver.resolve(&request.source_url).await?;

        if !self.settings.default_trackers.is_empty()
            && let Err(e) = self
                .engine
                .add_trackers(info_hash, &self.settings.default_trackers)
                .await
        {
            warn!("Could not add default trackers to {}: {}", info_hash, e);
        }

        MetadataWait::new(self, info_hash)
            .wait(self.settings.metadata_timeout, &cancel)
            .await?;

        let name = self.engine.name(info_hash).await?;
        info!(
            "Metadata received for {} ({})",
            name.as_deref().unwrap_or("unnamed"),
            info_hash
        );

        let files = self.engine.files(info_hash).await?;
        let selected = select_file(&files, request.hint)?;

        self.tracker.touch(info_hash);
        self.engine
            .set_priority(info_hash, selected.index, FilePriority::High)
            .await?;

        info!(
            "Ready in {:?}: {} (file {})",
            started.elapsed(),
            selected.path,
            selected.index
        );

        Ok(StreamTicket {
            info_hash,
            file_index: selected.index,
            file_name: selected.path.clone(),
        })
    }

    /// Opens a sequential, read-ahead stream over one file of a swarm.
    ///
    /// # Errors
    /// - `ManagerError::SwarmNotFound` - No swarm with that hash
    /// - `ManagerError::FileIndexOutOfRange` - Index past the end of the file list
    /// - `ManagerError::MetadataPending` - File list not known yet
    /// - `ManagerError::Engine` - Engine failure
    pub async fn open_stream(
        &self,
        info_hash: InfoHash,
        file_index: usize,
    ) -> Result<OpenedStream, ManagerError> {
        let files = self.engine.files(info_hash).await?;
        let file = files
            .get(file_index)
            .cloned()
            .ok_or(ManagerError::FileIndexOutOfRange {
                index: file_index,
                file_count: files.len(),
            })?;

        self.tracker.touch(info_hash);
        self.engine
            .set_priority(info_hash, file_index, FilePriority::Now)
            .await?;

        let reader = self
            .engine
            .open_stream(
                info_hash,
                file_index,
                StreamOptions {
                    sequential: true,
                    readahead: self.settings.stream_readahead,
                },
            )
            .await?;

        debug!("Opened stream for {} file {}", info_hash, file.path);
        Ok(OpenedStream { file, reader })
    }

    /// Drops a swarm on client request and forgets its access record.
    ///
    /// # Errors
    /// - `ManagerError::SwarmNotFound` - No swarm with that hash
    /// - `ManagerError::Engine` - Engine failed to drop it
    pub async fn remove_swarm(&self, info_hash: InfoHash) -> Result<(), ManagerError> {
        self.engine.drop_swarm(info_hash).await?;
        self.tracker.forget(&info_hash);
        info!("Removed swarm {} on request", info_hash);
        Ok(())
    }

    /// Summaries of every registered swarm, skipping ones dropped mid-listing.
    pub async fn list_swarms(&self) -> Vec<SwarmSummary> {
        let hashes = self.engine.swarms().await;
        let summaries =
            join_all(hashes.into_iter().map(|info_hash| self.summarize(info_hash))).await;

        let mut summaries: Vec<SwarmSummary> = summaries.into_iter().flatten().collect();
        summaries.sort_by_key(|summary| summary.info_hash);
        summaries
    }

    async fn summarize(&self, info_hash: InfoHash) -> Option<SwarmSummary> {
        let stats = self.engine.stats(info_hash).await.ok()?;
        let name = self.engine.name(info_hash).await.ok()?;
        let file_count = self.engine.files(info_hash).await.ok().map(|f| f.len());

        Some(SwarmSummary {
            info_hash,
            name,
            stats,
            ratio: stats.ratio(),
            idle_secs: self
                .tracker
                .last_access(&info_hash)
                .map(|last| last.elapsed().as_secs()),
            file_count,
        })
    }
}

/// Waits for one swarm's metadata. On every exit that is not success
/// (timeout, cancellation, engine error, or the waiting future being
/// dropped) the swarm is dropped and forgotten, unless another request is
/// still waiting on the same hash.
struct MetadataWait {
    engine: Arc<dyn SwarmEngine>,
    tracker: Arc<AccessTracker>,
    waiters: Arc<DashMap<InfoHash, usize>>,
    info_hash: InfoHash,
    armed: bool,
}

impl MetadataWait {
    fn new(manager: &SwarmManager, info_hash: InfoHash) -> Self {
        *manager.waiters.entry(info_hash).or_insert(0) += 1;
        Self {
            engine: manager.engine.clone(),
            tracker: manager.tracker.clone(),
            waiters: manager.waiters.clone(),
            info_hash,
            armed: true,
        }
    }

    async fn wait(
        mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ManagerError> {
        let info_hash = self.info_hash;
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, self.engine.wait_for_metadata(info_hash)) => {
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(ManagerError::from(e)),
                    Err(_) => Err(ManagerError::MetadataTimeout { info_hash, timeout }),
                }
            }
            _ = cancel.cancelled() => Err(ManagerError::Cancelled { info_hash }),
        };

        self.armed = false;
        let last = self.leave();
        match outcome {
            Ok(()) => Ok(()),
            Err(e) if last => {
                warn!("Abandoning swarm {}: {}", info_hash, e);
                release(&self.engine, &self.tracker, info_hash).await;
                Err(e)
            }
            Err(e) => {
                debug!("Leaving swarm {} to other waiting requests: {}", info_hash, e);
                Err(e)
            }
        }
    }

    /// Deregisters this waiter. True when it was the last one for the hash.
    fn leave(&self) -> bool {
        match self.waiters.entry(self.info_hash) {
            Entry::Occupied(mut entry) => {
                let remaining = entry.get().saturating_sub(1);
                if remaining == 0 {
                    entry.remove();
                    true
                } else {
                    *entry.get_mut() = remaining;
                    false
                }
            }
            Entry::Vacant(_) => true,
        }
    }
}

impl Drop for MetadataWait {
    fn drop(&mut self) {
        if !self.armed || !self.leave() {
            return;
        }

        let engine = self.engine.clone();
        let tracker = self.tracker.clone();
        let info_hash = self.info_hash;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { release(&engine, &tracker, info_hash).await });
            }
            Err(_) => {
                tracker.forget(&info_hash);
                warn!("No runtime to drop abandoned swarm {}", info_hash);
            }
        }
    }
}

async fn release(engine: &Arc<dyn SwarmEngine>, tracker: &AccessTracker, info_hash: InfoHash) {
    if let Err(e) = engine.drop_swarm(info_hash).await {
        debug!("Drop of abandoned swarm {} failed: {}", info_hash, e);
    }
    tracker.forget(&info_hash);
}
