//! Router-level tests against the simulated swarm engine.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use undertow_core::manager::ManagerSettings;
use undertow_core::{AccessTracker, SwarmEngine, SwarmManager, UndertowConfig};
use undertow_search::{CatalogClient, IndexerClient};
use undertow_sim::{BuiltMetainfo, MetainfoBuilder, SimulatedSwarmEngine, pattern_byte};
use undertow_web::{AppState, build_router};

struct Fixture {
    engine: SimulatedSwarmEngine,
    tracker: Arc<AccessTracker>,
    router: Router,
    season: BuiltMetainfo,
}

async fn fixture() -> Fixture {
    fixture_with_static(None).await
}

async fn fixture_with_static(static_dir: Option<&std::path::Path>) -> Fixture {
    let config = UndertowConfig::for_testing();
    let engine = SimulatedSwarmEngine::new();
    let season = engine
        .seed(
            MetainfoBuilder::new("Show.S01")
                .pattern_file("Show.S01E01.mkv", 1_000)
                .pattern_file("Show.S01E02.mkv", 2_000)
                .pattern_file("Show.S01E03.mkv", 1_500),
        )
        .await
        .unwrap();

    let tracker = Arc::new(AccessTracker::new());
    let manager = SwarmManager::new(
        Arc::new(engine.clone()),
        tracker.clone(),
        ManagerSettings::from(&config.swarm),
    )
    .unwrap();

    let state = AppState {
        manager,
        catalog: CatalogClient::new(&config.catalog).unwrap(),
        indexer: IndexerClient::new(&config.indexer).unwrap(),
        shutdown: CancellationToken::new(),
    };

    Fixture {
        engine,
        tracker,
        router: build_router(state, static_dir),
        season,
    }
}

impl Fixture {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn add(&self, body: Value) -> Response {
        self.send(
            Request::post("/api/torrent")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn add_season(&self) -> Value {
        let response = self
            .add(json!({"sourceUrl": self.season.magnet_uri(), "season": 1, "episode": 2}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await
    }
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn test_add_returns_stream_locator_for_requested_episode() {
    let fixture = fixture().await;

    let body = fixture.add_season().await;

    let info_hash = fixture.season.info_hash();
    assert_eq!(body["streamUrl"], format!("/api/stream/{info_hash}/1"));
    assert_eq!(body["fileName"], "Show.S01E02.mkv");
    assert!(fixture.tracker.last_access(&info_hash).is_some());
    assert_eq!(
        fixture.engine.priority_of(info_hash, 1),
        Some(undertow_core::swarm::FilePriority::High)
    );
}

#[tokio::test]
async fn test_add_without_hint_picks_largest_file() {
    let fixture = fixture().await;

    let response = fixture
        .add(json!({"sourceUrl": fixture.season.magnet_uri()}))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["streamUrl"].as_str().unwrap().ends_with("/1"));
}

#[tokio::test]
async fn test_add_rejects_malformed_body() {
    let fixture = fixture().await;

    let response = fixture
        .send(
            Request::post("/api/torrent")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = fixture.add(json!({"season": 1})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_add_unrecognized_magnet_is_resolution_failure() {
    let fixture = fixture().await;

    let response = fixture
        .add(json!({"sourceUrl": "magnet:?xt=urn:btih:ABC"}))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().starts_with("Failed to resolve source"));
}

#[tokio::test(start_paused = true)]
async fn test_metadata_timeout_is_gateway_timeout_and_cleans_up() {
    let fixture = fixture().await;
    let unknown = format!("magnet:?xt=urn:btih:{}", "ef".repeat(20));

    let response = fixture.add(json!({"sourceUrl": unknown})).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(fixture.engine.swarms().await.is_empty());
    assert!(fixture.tracker.is_empty());
}

#[tokio::test]
async fn test_range_request_returns_partial_content() {
    let fixture = fixture().await;
    fixture.add_season().await;
    let info_hash = fixture.season.info_hash();

    let response = fixture
        .send(
            Request::get(format!("/api/stream/{info_hash}/1"))
                .header("range", "bytes=100-199")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, "content-range"), "bytes 100-199/2000");
    assert_eq!(header(&response, "content-length"), "100");
    assert_eq!(header(&response, "accept-ranges"), "bytes");
    assert_eq!(header(&response, "content-type"), "video/x-matroska");

    let body = body_bytes(response).await;
    let expected: Vec<u8> = (100..200).map(pattern_byte).collect();
    assert_eq!(body, expected);

    let options = fixture.engine.last_stream_options(info_hash).unwrap();
    assert!(options.sequential);
}

#[tokio::test]
async fn test_full_and_suffix_requests() {
    let fixture = fixture().await;
    fixture.add_season().await;
    let uri = format!("/api/stream/{}/0", fixture.season.info_hash());

    let response = fixture.get(&uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "accept-ranges"), "bytes");
    assert_eq!(body_bytes(response).await.len(), 1_000);

    let response = fixture
        .send(
            Request::get(&uri)
                .header("range", "bytes=-10")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header(&response, "content-range"), "bytes 990-999/1000");
    assert_eq!(body_bytes(response).await.len(), 10);
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let fixture = fixture().await;
    fixture.add_season().await;

    let response = fixture
        .send(
            Request::get(format!("/api/stream/{}/0", fixture.season.info_hash()))
                .header("range", "bytes=5000-")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(header(&response, "content-range"), "bytes */1000");
}

#[tokio::test]
async fn test_stream_errors() {
    let fixture = fixture().await;
    fixture.add_season().await;
    let info_hash = fixture.season.info_hash();

    let out_of_range = fixture.get(&format!("/api/stream/{info_hash}/5")).await;
    assert_eq!(out_of_range.status(), StatusCode::NOT_FOUND);

    let bad_index = fixture.get(&format!("/api/stream/{info_hash}/abc")).await;
    assert_eq!(bad_index.status(), StatusCode::BAD_REQUEST);

    let bad_identity = fixture.get("/api/stream/not-a-hash/0").await;
    assert_eq!(bad_identity.status(), StatusCode::BAD_REQUEST);

    let unknown = fixture
        .get(&format!("/api/stream/{}/0", "00".repeat(20)))
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let pending_hash = "ab".repeat(20);
    fixture
        .engine
        .add_magnet(&format!("magnet:?xt=urn:btih:{pending_hash}"))
        .await
        .unwrap();
    let pending = fixture
        .get(&format!("/api/stream/{pending_hash}/0"))
        .await;
    assert_eq!(pending.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_and_remove() {
    let fixture = fixture().await;
    fixture.add_season().await;
    let info_hash = fixture.season.info_hash();

    let listing = json_body(fixture.get("/api/torrents").await).await;
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["torrents"][0]["info_hash"], info_hash.to_string());
    assert_eq!(listing["torrents"][0]["name"], "Show.S01");

    let delete = |identity: String| {
        Request::delete(format!("/api/torrent/{identity}"))
            .body(Body::empty())
            .unwrap()
    };

    let removed = fixture.send(delete(info_hash.to_string())).await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
    assert!(fixture.tracker.last_access(&info_hash).is_none());

    let again = fixture.send(delete(info_hash.to_string())).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let malformed = fixture.send(delete("zz".to_string())).await;
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);

    let listing = json_body(fixture.get("/api/torrents").await).await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let fixture = fixture().await;

    for response in [
        fixture.get("/api/torrents").await,
        fixture.get("/api/stream/bad/0").await,
    ] {
        assert_eq!(header(&response, "cross-origin-opener-policy"), "same-origin");
        assert_eq!(
            header(&response, "cross-origin-embedder-policy"),
            "credentialless"
        );
    }
}

#[tokio::test]
async fn test_lookup_routes_validate_parameters() {
    let fixture = fixture().await;

    let season = fixture.get("/api/season?id=1399").await;
    assert_eq!(season.status(), StatusCode::BAD_REQUEST);

    let episode = fixture.get("/api/episode?id=1399&season=1").await;
    assert_eq!(episode.status(), StatusCode::BAD_REQUEST);

    let indexer = fixture
        .get("/api/indexer?type=movie&imdbId=tt0133093&title=The%20Matrix")
        .await;
    assert_eq!(indexer.status(), StatusCode::BAD_REQUEST);
    let body = json_body(indexer).await;
    assert!(body["error"].as_str().unwrap().contains("year"));
}

#[tokio::test]
async fn test_static_directory_serves_spa_fallback() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<html>app</html>").unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
    let fixture = fixture_with_static(Some(dir.path())).await;

    let asset = fixture.get("/app.js").await;
    assert_eq!(asset.status(), StatusCode::OK);
    assert_eq!(body_bytes(asset).await, b"console.log(1)");

    let route = fixture.get("/movies/603").await;
    assert_eq!(route.status(), StatusCode::OK);
    assert_eq!(body_bytes(route).await, b"<html>app</html>");
}
