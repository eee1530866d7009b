//! Shared fixtures for the integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use undertow_core::manager::ManagerSettings;
use undertow_core::{AccessTracker, AddSourceRequest, EpisodeHint, SwarmManager};
use undertow_sim::{BuiltMetainfo, MetainfoBuilder, SimulatedSwarmEngine};

pub struct Harness {
    pub engine: SimulatedSwarmEngine,
    pub tracker: Arc<AccessTracker>,
    pub manager: SwarmManager,
}

pub fn settings(metadata_timeout: Duration) -> ManagerSettings {
    ManagerSettings {
        metadata_timeout,
        stream_readahead: 1024,
        default_trackers: Vec::new(),
    }
}

pub fn harness(engine: SimulatedSwarmEngine, settings: ManagerSettings) -> Harness {
    let tracker = Arc::new(AccessTracker::new());
    let manager = SwarmManager::new(Arc::new(engine.clone()), tracker.clone(), settings).unwrap();
    Harness {
        engine,
        tracker,
        manager,
    }
}

pub fn default_harness() -> Harness {
    harness(
        SimulatedSwarmEngine::new(),
        settings(Duration::from_secs(5)),
    )
}

pub async fn seed_season(engine: &SimulatedSwarmEngine) -> BuiltMetainfo {
    engine
        .seed(
            MetainfoBuilder::new("Show.S02")
                .pattern_file("Show.S02E01.mkv", 3_000)
                .pattern_file("Show.S02E02.mkv", 2_000)
                .pattern_file("extras/Show.S02.nfo", 10_000),
        )
        .await
        .unwrap()
}

/// Magnet for content nobody seeds; its metadata never arrives.
pub fn orphan_magnet(byte: u8) -> String {
    format!("magnet:?xt=urn:btih:{}", hex_repeat(byte))
}

pub fn hex_repeat(byte: u8) -> String {
    format!("{byte:02x}").repeat(20)
}

pub fn request(source_url: impl Into<String>, hint: Option<(i64, i64)>) -> AddSourceRequest {
    AddSourceRequest {
        source_url: source_url.into(),
        hint: hint.and_then(|(season, episode)| {
            EpisodeHint::from_request(Some(season), Some(episode))
        }),
    }
}

pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}
