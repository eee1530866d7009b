//! Source resolution through a real HTTP fetch.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use undertow_core::resolver::ResolveError;
use undertow_core::swarm::SwarmError;
use undertow_core::{ManagerError, SourceResolver, SwarmEngine};
use undertow_sim::{MetainfoBuilder, SimulatedSwarmEngine};

use crate::support::{default_harness, hex_repeat, request, seed_season, serve};

fn resolver(engine: &SimulatedSwarmEngine) -> SourceResolver {
    SourceResolver::new(Arc::new(engine.clone()), Duration::from_secs(5)).unwrap()
}

fn redirect_router(target: String, hits: Arc<AtomicUsize>) -> Router {
    Router::new()
        .route(
            "/download",
            get(move |State(hits): State<Arc<AtomicUsize>>| {
                let target = target.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::FOUND, [(LOCATION, target)])
                }
            }),
        )
        .with_state(hits)
}

#[tokio::test]
async fn test_redirect_to_unparseable_magnet_is_recorded_once() {
    let engine = SimulatedSwarmEngine::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let base = serve(redirect_router("magnet:?xt=urn:btih:ABC".to_string(), hits.clone())).await;

    let result = resolver(&engine).resolve(&format!("{base}/download")).await;

    assert!(matches!(
        result,
        Err(ResolveError::Engine(SwarmError::InvalidMagnet { .. }))
    ));
    assert_eq!(engine.magnet_requests(), vec!["magnet:?xt=urn:btih:ABC"]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(engine.swarms().await.is_empty());
}

#[tokio::test]
async fn test_redirect_to_valid_magnet_registers_swarm() {
    let engine = SimulatedSwarmEngine::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let target = format!("magnet:?xt=urn:btih:{}&dn=Redirected", hex_repeat(0x3c));
    let base = serve(redirect_router(target, hits.clone())).await;

    let info_hash = resolver(&engine)
        .resolve(&format!("{base}/download"))
        .await
        .unwrap();

    assert_eq!(info_hash.to_string(), hex_repeat(0x3c));
    assert_eq!(engine.swarms().await, vec![info_hash]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_metainfo_body_is_registered_with_metadata() {
    let harness = default_harness();
    let built = MetainfoBuilder::new("Film.2024")
        .pattern_file("Film.2024.mp4", 4_096)
        .pattern_file("Film.2024.srt", 100)
        .build()
        .await
        .unwrap();
    let bytes = built.bytes.clone();
    let base = serve(Router::new().route(
        "/film.torrent",
        get(move || {
            let bytes = bytes.clone();
            async move { bytes }
        }),
    ))
    .await;

    let ticket = harness
        .manager
        .add_source(
            request(format!("{base}/film.torrent"), None),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(ticket.info_hash, built.info_hash());
    assert_eq!(ticket.file_index, 0);
    assert_eq!(ticket.file_name, "Film.2024.mp4");
    assert!(harness.engine.magnet_requests().is_empty());
}

#[tokio::test]
async fn test_magnet_text_body_is_registered_as_magnet() {
    let harness = default_harness();
    let season = seed_season(&harness.engine).await;
    let body = format!("\n{}\n", season.magnet_uri());
    let base = serve(Router::new().route(
        "/link.txt",
        get(move || {
            let body = body.clone();
            async move { body }
        }),
    ))
    .await;

    let ticket = harness
        .manager
        .add_source(
            request(format!("{base}/link.txt"), Some((2, 2))),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(ticket.info_hash, season.info_hash());
    assert_eq!(ticket.file_name, "Show.S02E02.mkv");
    assert_eq!(harness.engine.magnet_requests(), vec![season.magnet_uri()]);
}

#[tokio::test]
async fn test_unrecognized_body_and_error_status() {
    let engine = SimulatedSwarmEngine::new();
    let base = serve(
        Router::new()
            .route("/page", get(|| async { "<html>nothing here</html>" }))
            .route("/gone", get(|| async { StatusCode::NOT_FOUND.into_response() })),
    )
    .await;
    let resolver = resolver(&engine);

    let page = resolver.resolve(&format!("{base}/page")).await;
    assert!(matches!(page, Err(ResolveError::UnrecognizedFormat)));

    let gone = resolver.resolve(&format!("{base}/gone")).await;
    assert!(matches!(
        gone,
        Err(ResolveError::UpstreamStatus { status: 404, .. })
    ));

    assert!(engine.swarms().await.is_empty());
    assert!(engine.magnet_requests().is_empty());
}

#[tokio::test]
async fn test_unreachable_source_is_resolution_failure() {
    let harness = default_harness();

    let result = harness
        .manager
        .add_source(
            request("http://127.0.0.1:1/never.torrent", None),
            CancellationToken::new(),
        )
        .await;

    assert!(matches!(
        result,
        Err(ManagerError::Resolve(ResolveError::Fetch { .. }))
    ));
    assert!(harness.tracker.is_empty());
}
