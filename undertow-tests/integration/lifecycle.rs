//! Add, stream and remove flows through the swarm manager.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use undertow_core::swarm::{FilePriority, InfoHash};
use undertow_core::{ManagerError, SelectionError, SwarmEngine};
use undertow_sim::{MetainfoBuilder, SimulatedSwarmEngine, pattern_byte};

use crate::support::{
    default_harness, harness, orphan_magnet, request, seed_season, settings,
};

async fn wait_until_empty(engine: &SimulatedSwarmEngine) {
    for _ in 0..100 {
        if engine.swarms().await.is_empty() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("swarm was never released");
}

#[tokio::test]
async fn test_add_selects_hinted_episode_and_touches() {
    let harness = default_harness();
    let season = seed_season(&harness.engine).await;

    let ticket = harness
        .manager
        .add_source(request(season.magnet_uri(), Some((2, 2))), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ticket.file_index, 1);
    assert_eq!(ticket.file_name, "Show.S02E02.mkv");
    assert_eq!(
        ticket.stream_path(),
        format!("/api/stream/{}/1", season.info_hash())
    );
    assert!(harness.tracker.last_access(&season.info_hash()).is_some());
    assert_eq!(
        harness.engine.priority_of(season.info_hash(), 1),
        Some(FilePriority::High)
    );
}

#[tokio::test]
async fn test_add_without_hint_skips_larger_non_video() {
    let harness = default_harness();
    let season = seed_season(&harness.engine).await;

    let ticket = harness
        .manager
        .add_source(request(season.magnet_uri(), None), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ticket.file_index, 0);
}

#[tokio::test]
async fn test_default_trackers_are_appended() {
    let mut settings = settings(Duration::from_secs(5));
    settings.default_trackers = vec!["udp://tracker.example:1337/announce".to_string()];
    let harness = harness(SimulatedSwarmEngine::new(), settings);
    let season = seed_season(&harness.engine).await;

    harness
        .manager
        .add_source(request(season.magnet_uri(), None), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        harness.engine.trackers(season.info_hash()),
        vec!["udp://tracker.example:1337/announce".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_metadata_timeout_drops_swarm() {
    let harness = default_harness();

    let result = harness
        .manager
        .add_source(request(orphan_magnet(0xaa), None), CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ManagerError::MetadataTimeout { timeout, .. }) if timeout == Duration::from_secs(5)
    ));
    assert!(harness.engine.swarms().await.is_empty());
    assert!(harness.tracker.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_delayed_metadata_within_timeout_succeeds() {
    let harness = harness(
        SimulatedSwarmEngine::with_metadata_delay(Duration::from_secs(3)),
        settings(Duration::from_secs(5)),
    );
    let season = seed_season(&harness.engine).await;

    let ticket = harness
        .manager
        .add_source(request(season.magnet_uri(), None), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ticket.info_hash, season.info_hash());
}

#[tokio::test]
async fn test_cancellation_drops_swarm() {
    let harness = default_harness();
    let cancel = CancellationToken::new();

    let manager = harness.manager.clone();
    let token = cancel.clone();
    let pending = tokio::spawn(async move {
        manager
            .add_source(request(orphan_magnet(0xbb), None), token)
            .await
    });

    while harness.engine.swarms().await.is_empty() {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(ManagerError::Cancelled { .. })));
    assert!(harness.engine.swarms().await.is_empty());
    assert!(harness.tracker.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_releases_swarm() {
    let harness = harness(SimulatedSwarmEngine::new(), settings(Duration::from_secs(60)));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        harness
            .manager
            .add_source(request(orphan_magnet(0xcc), None), CancellationToken::new()),
    )
    .await;
    assert!(abandoned.is_err());

    wait_until_empty(&harness.engine).await;
    assert!(harness.tracker.is_empty());
}

#[tokio::test]
async fn test_selection_failure_keeps_swarm() {
    let harness = default_harness();
    let docs = harness
        .engine
        .seed(
            MetainfoBuilder::new("Docs")
                .pattern_file("readme.txt", 100)
                .pattern_file("cover.jpg", 200),
        )
        .await
        .unwrap();

    let result = harness
        .manager
        .add_source(request(docs.magnet_uri(), None), CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(ManagerError::Selection(SelectionError::NoSuitableFile { file_count: 2 }))
    ));
    assert_eq!(harness.engine.swarms().await, vec![docs.info_hash()]);
}

#[tokio::test]
async fn test_concurrent_duplicate_adds_share_one_swarm() {
    let harness = harness(
        SimulatedSwarmEngine::with_metadata_delay(Duration::from_millis(20)),
        settings(Duration::from_secs(5)),
    );
    let season = seed_season(&harness.engine).await;

    let (first, second) = tokio::join!(
        harness
            .manager
            .add_source(request(season.magnet_uri(), None), CancellationToken::new()),
        harness
            .manager
            .add_source(request(season.magnet_uri(), None), CancellationToken::new()),
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(harness.engine.swarms().await, vec![season.info_hash()]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_duplicate_leaves_swarm_for_other_request() {
    let harness = harness(
        SimulatedSwarmEngine::with_metadata_delay(Duration::from_millis(200)),
        settings(Duration::from_secs(5)),
    );
    let season = seed_season(&harness.engine).await;
    let abandon = CancellationToken::new();

    let quitter = {
        let manager = harness.manager.clone();
        let token = abandon.clone();
        let uri = season.magnet_uri();
        tokio::spawn(async move { manager.add_source(request(uri, None), token).await })
    };
    let stayer = {
        let manager = harness.manager.clone();
        let uri = season.magnet_uri();
        tokio::spawn(async move {
            manager
                .add_source(request(uri, None), CancellationToken::new())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    abandon.cancel();

    let quit = quitter.await.unwrap();
    assert!(matches!(quit, Err(ManagerError::Cancelled { .. })));

    let ticket = stayer.await.unwrap().unwrap();
    assert_eq!(ticket.info_hash, season.info_hash());
    assert_eq!(harness.engine.swarms().await, vec![season.info_hash()]);
    assert!(harness.tracker.last_access(&season.info_hash()).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_last_cancelled_waiter_drops_shared_swarm() {
    let harness = harness(SimulatedSwarmEngine::new(), settings(Duration::from_secs(60)));
    let first = CancellationToken::new();
    let second = CancellationToken::new();

    let spawn_add = |token: CancellationToken| {
        let manager = harness.manager.clone();
        tokio::spawn(async move {
            manager
                .add_source(request(orphan_magnet(0xcc), None), token)
                .await
        })
    };
    let first_request = spawn_add(first.clone());
    let second_request = spawn_add(second.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;
    first.cancel();
    assert!(first_request.await.unwrap().is_err());
    assert_eq!(harness.engine.swarms().await.len(), 1);

    second.cancel();
    assert!(second_request.await.unwrap().is_err());
    assert!(harness.engine.swarms().await.is_empty());
    assert!(harness.tracker.is_empty());
}

#[tokio::test]
async fn test_open_stream_reads_content_and_raises_priority() {
    let harness = default_harness();
    let season = seed_season(&harness.engine).await;
    let info_hash = season.info_hash();
    harness
        .manager
        .add_source(request(season.magnet_uri(), None), CancellationToken::new())
        .await
        .unwrap();

    let mut opened = harness.manager.open_stream(info_hash, 1).await.unwrap();
    let mut content = Vec::new();
    opened.reader.read_to_end(&mut content).await.unwrap();

    assert_eq!(opened.file.length, 2_000);
    let expected: Vec<u8> = (0..2_000).map(pattern_byte).collect();
    assert_eq!(content, expected);
    assert_eq!(
        harness.engine.priority_of(info_hash, 1),
        Some(FilePriority::Now)
    );
    let options = harness.engine.last_stream_options(info_hash).unwrap();
    assert!(options.sequential);
    assert_eq!(options.readahead, 1024);
}

#[tokio::test]
async fn test_open_stream_errors() {
    let harness = default_harness();
    let season = seed_season(&harness.engine).await;
    harness
        .manager
        .add_source(request(season.magnet_uri(), None), CancellationToken::new())
        .await
        .unwrap();

    let out_of_range = harness.manager.open_stream(season.info_hash(), 5).await;
    assert!(matches!(
        out_of_range,
        Err(ManagerError::FileIndexOutOfRange {
            index: 5,
            file_count: 3
        })
    ));

    let unknown = InfoHash::new([7u8; 20]);
    let missing = harness.manager.open_stream(unknown, 0).await;
    assert!(matches!(missing, Err(ManagerError::SwarmNotFound { .. })));
    assert!(harness.tracker.last_access(&unknown).is_none());
}

#[tokio::test]
async fn test_remove_swarm() {
    let harness = default_harness();
    let season = seed_season(&harness.engine).await;
    harness
        .manager
        .add_source(request(season.magnet_uri(), None), CancellationToken::new())
        .await
        .unwrap();

    harness.manager.remove_swarm(season.info_hash()).await.unwrap();

    assert!(harness.engine.swarms().await.is_empty());
    assert!(harness.tracker.is_empty());
    assert!(matches!(
        harness.manager.remove_swarm(season.info_hash()).await,
        Err(ManagerError::SwarmNotFound { .. })
    ));
}

#[tokio::test]
async fn test_list_swarms_reports_pending_and_ready() {
    let harness = default_harness();
    let season = seed_season(&harness.engine).await;
    harness
        .manager
        .add_source(request(season.magnet_uri(), None), CancellationToken::new())
        .await
        .unwrap();
    let pending = harness
        .engine
        .add_magnet(&orphan_magnet(0xdd))
        .await
        .unwrap();

    let summaries = harness.manager.list_swarms().await;

    assert_eq!(summaries.len(), 2);
    let ready = summaries
        .iter()
        .find(|s| s.info_hash == season.info_hash())
        .unwrap();
    assert_eq!(ready.name.as_deref(), Some("Show.S02"));
    assert_eq!(ready.file_count, Some(3));
    assert!(ready.idle_secs.is_some());

    let waiting = summaries.iter().find(|s| s.info_hash == pending).unwrap();
    assert_eq!(waiting.name, None);
    assert_eq!(waiting.file_count, None);
    assert_eq!(waiting.idle_secs, None);
}
