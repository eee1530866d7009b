//! In-memory [`SwarmEngine`] with seeded content and scriptable failures.
//!
//! Content is registered in a library up front. Swarms whose hash matches
//! library content receive metadata (after an optional delay) and stream the
//! seeded bytes. Magnets for unknown content stay pending until dropped.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};
use undertow_core::selector::is_video;
use undertow_core::swarm::{
    BoxedReader, FilePriority, InfoHash, MagnetParser, MetainfoParser, StreamOptions,
    SwarmEngine, SwarmError, SwarmFile, SwarmStats,
};

use crate::content::FileSource;
use crate::metainfo::{BuiltMetainfo, MetainfoBuilder};

struct SimulatedSwarm {
    name: Option<String>,
    files: Option<Vec<SwarmFile>>,
    sources: Vec<FileSource>,
    trackers: Vec<String>,
    stats: SwarmStats,
    metadata: watch::Sender<bool>,
    last_stream: Option<StreamOptions>,
}

impl SimulatedSwarm {
    fn pending(trackers: Vec<String>) -> Self {
        let (metadata, _) = watch::channel(false);
        Self {
            name: None,
            files: None,
            sources: Vec::new(),
            trackers,
            stats: SwarmStats::default(),
            metadata,
            last_stream: None,
        }
    }

    fn publish(&mut self, built: &BuiltMetainfo) {
        self.name = Some(built.metainfo.name.clone());
        self.files = Some(
            built
                .metainfo
                .files
                .iter()
                .enumerate()
                .map(|(index, file)| SwarmFile {
                    index,
                    path: file.display_path(),
                    length: file.length,
                    priority: FilePriority::Normal,
                })
                .collect(),
        );
        self.sources = built.sources.clone();
        self.metadata.send_replace(true);
    }

    fn files(&self, info_hash: InfoHash) -> Result<&Vec<SwarmFile>, SwarmError> {
        self.files
            .as_ref()
            .ok_or(SwarmError::MetadataPending { info_hash })
    }
}

#[derive(Default)]
struct State {
    swarms: HashMap<InfoHash, SimulatedSwarm>,
    library: HashMap<InfoHash, BuiltMetainfo>,
    failing_drops: HashSet<InfoHash>,
    magnet_requests: Vec<String>,
}

impl State {
    fn swarm(&self, info_hash: InfoHash) -> Result<&SimulatedSwarm, SwarmError> {
        self.swarms
            .get(&info_hash)
            .ok_or(SwarmError::NotFound { info_hash })
    }

    fn swarm_mut(&mut self, info_hash: InfoHash) -> Result<&mut SimulatedSwarm, SwarmError> {
        self.swarms
            .get_mut(&info_hash)
            .ok_or(SwarmError::NotFound { info_hash })
    }
}

struct Inner {
    state: RwLock<State>,
    metadata_delay: Duration,
}

/// Swarm engine that serves seeded content without touching the network.
#[derive(Clone)]
pub struct SimulatedSwarmEngine {
    inner: Arc<Inner>,
}

impl SimulatedSwarmEngine {
    /// Engine whose seeded magnets receive metadata immediately.
    pub fn new() -> Self {
        Self::with_metadata_delay(Duration::ZERO)
    }

    /// Engine whose seeded magnets receive metadata after `delay`.
    pub fn with_metadata_delay(delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                metadata_delay: delay,
            }),
        }
    }

    /// Builds `builder` and adds the result to the content library.
    ///
    /// # Errors
    /// - `SwarmError::InvalidMetainfo` - Builder had no files
    /// - `SwarmError::Io` - Content could not be read while hashing
    pub async fn seed(&self, builder: MetainfoBuilder) -> Result<BuiltMetainfo, SwarmError> {
        let built = builder.build().await?;
        debug!(
            "Seeded {} ({} files) as {}",
            built.metainfo.name,
            built.metainfo.files.len(),
            built.info_hash()
        );
        self.inner
            .state
            .write()
            .library
            .insert(built.info_hash(), built.clone());
        Ok(built)
    }

    /// Seeds every video file directly inside `dir`, sorted by path.
    ///
    /// # Errors
    /// - `SwarmError::Io` - Directory or a file in it could not be read
    pub async fn seed_directory(&self, dir: &Path) -> Result<Vec<BuiltMetainfo>, SwarmError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && is_video(&path.to_string_lossy()) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut seeded = Vec::with_capacity(paths.len());
        for path in paths {
            let builder = MetainfoBuilder::from_local_file(&path).await?;
            let built = self.seed(builder).await?;
            info!("Seeded {} -> {}", path.display(), built.magnet_uri());
            seeded.push(built);
        }
        Ok(seeded)
    }

    /// Delivers metadata to a pending swarm. Returns false when the swarm is
    /// gone, already has metadata, or its content is not in the library.
    pub fn publish_metadata(&self, info_hash: InfoHash) -> bool {
        let mut state = self.inner.state.write();
        let State {
            swarms, library, ..
        } = &mut *state;

        match (swarms.get_mut(&info_hash), library.get(&info_hash)) {
            (Some(swarm), Some(built)) if swarm.files.is_none() => {
                swarm.publish(built);
                debug!("Metadata published for {}", info_hash);
                true
            }
            _ => false,
        }
    }

    /// Overrides the byte counters reported for a swarm.
    ///
    /// # Errors
    /// - `SwarmError::NotFound` - Swarm is not registered
    pub fn set_stats(&self, info_hash: InfoHash, stats: SwarmStats) -> Result<(), SwarmError> {
        self.inner.state.write().swarm_mut(info_hash)?.stats = stats;
        Ok(())
    }

    /// Makes every later drop of `info_hash` fail with an engine error.
    pub fn fail_drops_for(&self, info_hash: InfoHash) {
        self.inner.state.write().failing_drops.insert(info_hash);
    }

    /// Every URI passed to `add_magnet`, valid or not, in call order.
    pub fn magnet_requests(&self) -> Vec<String> {
        self.inner.state.read().magnet_requests.clone()
    }

    pub fn priority_of(&self, info_hash: InfoHash, file_index: usize) -> Option<FilePriority> {
        let state = self.inner.state.read();
        let files = state.swarms.get(&info_hash)?.files.as_ref()?;
        files.get(file_index).map(|file| file.priority)
    }

    /// Options of the most recent stream opened on a swarm.
    pub fn last_stream_options(&self, info_hash: InfoHash) -> Option<StreamOptions> {
        self.inner.state.read().swarms.get(&info_hash)?.last_stream
    }

    pub fn trackers(&self, info_hash: InfoHash) -> Vec<String> {
        self.inner
            .state
            .read()
            .swarms
            .get(&info_hash)
            .map(|swarm| swarm.trackers.clone())
            .unwrap_or_default()
    }

    fn schedule_metadata(&self, info_hash: InfoHash) {
        let delay = self.inner.metadata_delay;
        if delay.is_zero() {
            self.publish_metadata(info_hash);
            return;
        }

        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.publish_metadata(info_hash);
        });
    }
}

impl Default for SimulatedSwarmEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn append_unique(target: &mut Vec<String>, trackers: &[String]) {
    for tracker in trackers {
        if !target.contains(tracker) {
            target.push(tracker.clone());
        }
    }
}

#[async_trait]
impl SwarmEngine for SimulatedSwarmEngine {
    async fn add_magnet(&self, uri: &str) -> Result<InfoHash, SwarmError> {
        self.inner.state.write().magnet_requests.push(uri.to_string());
        let magnet = MagnetParser::parse(uri)?;
        let info_hash = magnet.info_hash;

        let known = {
            let mut state = self.inner.state.write();
            if let Some(existing) = state.swarms.get_mut(&info_hash) {
                append_unique(&mut existing.trackers, &magnet.trackers);
                return Ok(info_hash);
            }
            state
                .swarms
                .insert(info_hash, SimulatedSwarm::pending(magnet.trackers));
            state.library.contains_key(&info_hash)
        };

        if known {
            self.schedule_metadata(info_hash);
        } else {
            debug!("No seeded content for {}, metadata stays pending", info_hash);
        }
        Ok(info_hash)
    }

    async fn add_metainfo(&self, metainfo: &[u8]) -> Result<InfoHash, SwarmError> {
        let parsed = MetainfoParser::parse(metainfo)?;
        let info_hash = parsed.info_hash;

        let mut state = self.inner.state.write();
        if let Some(existing) = state.swarms.get_mut(&info_hash) {
            append_unique(&mut existing.trackers, &parsed.announce_urls);
            return Ok(info_hash);
        }

        // Unseeded documents stream generated bytes of the advertised lengths.
        let built = match state.library.get(&info_hash) {
            Some(built) => built.clone(),
            None => BuiltMetainfo {
                bytes: metainfo.to_vec(),
                sources: parsed
                    .files
                    .iter()
                    .map(|file| FileSource::Pattern {
                        length: file.length,
                    })
                    .collect(),
                metainfo: parsed.clone(),
            },
        };

        let mut swarm = SimulatedSwarm::pending(parsed.announce_urls);
        swarm.publish(&built);
        state.swarms.insert(info_hash, swarm);
        Ok(info_hash)
    }

    async fn add_trackers(
        &self,
        info_hash: InfoHash,
        trackers: &[String],
    ) -> Result<(), SwarmError> {
        let mut state = self.inner.state.write();
        append_unique(&mut state.swarm_mut(info_hash)?.trackers, trackers);
        Ok(())
    }

    async fn wait_for_metadata(&self, info_hash: InfoHash) -> Result<(), SwarmError> {
        let mut ready = self.inner.state.read().swarm(info_hash)?.metadata.subscribe();
        ready
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| SwarmError::NotFound { info_hash })?;
        Ok(())
    }

    async fn name(&self, info_hash: InfoHash) -> Result<Option<String>, SwarmError> {
        Ok(self.inner.state.read().swarm(info_hash)?.name.clone())
    }

    async fn files(&self, info_hash: InfoHash) -> Result<Vec<SwarmFile>, SwarmError> {
        let state = self.inner.state.read();
        Ok(state.swarm(info_hash)?.files(info_hash)?.clone())
    }

    async fn set_priority(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        priority: FilePriority,
    ) -> Result<(), SwarmError> {
        let mut state = self.inner.state.write();
        let swarm = state.swarm_mut(info_hash)?;
        let files = swarm
            .files
            .as_mut()
            .ok_or(SwarmError::MetadataPending { info_hash })?;
        let file_count = files.len();
        let file = files
            .get_mut(file_index)
            .ok_or(SwarmError::FileIndexOutOfRange {
                index: file_index,
                file_count,
            })?;
        file.priority = priority;
        Ok(())
    }

    async fn open_stream(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        options: StreamOptions,
    ) -> Result<BoxedReader, SwarmError> {
        let source = {
            let mut state = self.inner.state.write();
            let swarm = state.swarm_mut(info_hash)?;
            let file_count = swarm.files(info_hash)?.len();
            let source = swarm.sources.get(file_index).cloned().ok_or(
                SwarmError::FileIndexOutOfRange {
                    index: file_index,
                    file_count,
                },
            )?;
            swarm.last_stream = Some(options);
            source
        };

        Ok(source.open().await?)
    }

    async fn drop_swarm(&self, info_hash: InfoHash) -> Result<(), SwarmError> {
        let mut state = self.inner.state.write();
        if state.failing_drops.contains(&info_hash) {
            return Err(SwarmError::Engine {
                reason: format!("simulated drop failure for {info_hash}"),
            });
        }

        // Dropping the swarm drops its metadata sender, waking any waiter.
        state
            .swarms
            .remove(&info_hash)
            .map(|_| ())
            .ok_or(SwarmError::NotFound { info_hash })
    }

    async fn stats(&self, info_hash: InfoHash) -> Result<SwarmStats, SwarmError> {
        Ok(self.inner.state.read().swarm(info_hash)?.stats)
    }

    async fn swarms(&self) -> Vec<InfoHash> {
        let mut hashes: Vec<InfoHash> = self.inner.state.read().swarms.keys().copied().collect();
        hashes.sort();
        hashes
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::content::pattern_byte;

    async fn seeded_engine() -> (SimulatedSwarmEngine, BuiltMetainfo) {
        let engine = SimulatedSwarmEngine::new();
        let built = engine
            .seed(
                MetainfoBuilder::new("Show.S01")
                    .pattern_file("Show.S01E01.mkv", 2048)
                    .pattern_file("Show.S01E02.mkv", 4096),
            )
            .await
            .unwrap();
        (engine, built)
    }

    #[tokio::test]
    async fn test_seeded_magnet_gets_metadata() {
        let (engine, built) = seeded_engine().await;

        let info_hash = engine.add_magnet(&built.magnet_uri()).await.unwrap();
        engine.wait_for_metadata(info_hash).await.unwrap();

        let files = engine.files(info_hash).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].path, "Show.S01E02.mkv");
        assert_eq!(engine.name(info_hash).await.unwrap().as_deref(), Some("Show.S01"));
    }

    #[tokio::test]
    async fn test_unknown_magnet_stays_pending() {
        let engine = SimulatedSwarmEngine::new();
        let uri = format!("magnet:?xt=urn:btih:{}", "ab".repeat(20));

        let info_hash = engine.add_magnet(&uri).await.unwrap();
        assert!(matches!(
            engine.files(info_hash).await,
            Err(SwarmError::MetadataPending { .. })
        ));
        assert_eq!(engine.name(info_hash).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drop_wakes_metadata_waiter() {
        let engine = SimulatedSwarmEngine::new();
        let uri = format!("magnet:?xt=urn:btih:{}", "cd".repeat(20));
        let info_hash = engine.add_magnet(&uri).await.unwrap();

        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.wait_for_metadata(info_hash).await })
        };
        tokio::task::yield_now().await;
        engine.drop_swarm(info_hash).await.unwrap();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(SwarmError::NotFound { .. })));
        assert!(engine.swarms().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_metadata() {
        let engine = SimulatedSwarmEngine::with_metadata_delay(Duration::from_secs(5));
        let built = engine
            .seed(MetainfoBuilder::new("x").pattern_file("Movie.mp4", 100))
            .await
            .unwrap();

        let info_hash = engine.add_magnet(&built.magnet_uri()).await.unwrap();
        assert!(engine.files(info_hash).await.is_err());

        tokio::time::timeout(Duration::from_secs(6), engine.wait_for_metadata(info_hash))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(engine.files(info_hash).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_add_returns_same_swarm() {
        let (engine, built) = seeded_engine().await;

        let first = engine.add_magnet(&built.magnet_uri()).await.unwrap();
        let second = engine.add_metainfo(&built.bytes).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.swarms().await, vec![first]);
    }

    #[tokio::test]
    async fn test_invalid_magnet_is_recorded_then_rejected() {
        let engine = SimulatedSwarmEngine::new();

        assert!(engine.add_magnet("magnet:?xt=urn:btih:ABC").await.is_err());
        assert_eq!(engine.magnet_requests(), vec!["magnet:?xt=urn:btih:ABC"]);
        assert!(engine.swarms().await.is_empty());
    }

    #[tokio::test]
    async fn test_stream_reads_seeded_bytes() {
        let (engine, built) = seeded_engine().await;
        let info_hash = engine.add_metainfo(&built.bytes).await.unwrap();

        let options = StreamOptions {
            sequential: true,
            readahead: 1024,
        };
        let mut reader = engine.open_stream(info_hash, 1, options).await.unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();

        assert_eq!(content.len(), 4096);
        assert_eq!(content[300], pattern_byte(300));
        assert_eq!(engine.last_stream_options(info_hash), Some(options));
    }

    #[tokio::test]
    async fn test_priority_and_index_checks() {
        let (engine, built) = seeded_engine().await;
        let info_hash = engine.add_metainfo(&built.bytes).await.unwrap();

        engine
            .set_priority(info_hash, 0, FilePriority::High)
            .await
            .unwrap();
        assert_eq!(engine.priority_of(info_hash, 0), Some(FilePriority::High));
        assert!(matches!(
            engine.set_priority(info_hash, 2, FilePriority::Now).await,
            Err(SwarmError::FileIndexOutOfRange {
                index: 2,
                file_count: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_failing_drop_keeps_swarm() {
        let (engine, built) = seeded_engine().await;
        let info_hash = engine.add_metainfo(&built.bytes).await.unwrap();

        engine.fail_drops_for(info_hash);
        assert!(matches!(
            engine.drop_swarm(info_hash).await,
            Err(SwarmError::Engine { .. })
        ));
        assert_eq!(engine.swarms().await, vec![info_hash]);
    }

    #[tokio::test]
    async fn test_seed_directory_only_takes_videos() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.mkv"), vec![7u8; 300]).await.unwrap();
        tokio::fs::write(dir.path().join("a.mp4"), vec![9u8; 200]).await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), b"skip").await.unwrap();

        let engine = SimulatedSwarmEngine::new();
        let seeded = engine.seed_directory(dir.path()).await.unwrap();

        let names: Vec<&str> = seeded.iter().map(|b| b.metainfo.name.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "b.mkv"]);

        let info_hash = engine.add_magnet(&seeded[1].magnet_uri()).await.unwrap();
        let mut reader = engine
            .open_stream(
                info_hash,
                0,
                StreamOptions {
                    sequential: true,
                    readahead: 0,
                },
            )
            .await
            .unwrap();
        let mut content = Vec::new();
        reader.read_to_end(&mut content).await.unwrap();
        assert_eq!(content, vec![7u8; 300]);
    }
}
