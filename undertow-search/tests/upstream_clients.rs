//! Catalog and indexer clients against local stand-in upstreams.

use std::collections::HashMap;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use undertow_core::config::{CatalogConfig, IndexerConfig};
use undertow_search::{
    CatalogClient, IndexerClient, IndexerParams, IndexerQuery, MediaSearchError,
};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

async fn fake_indexer(
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("secret") {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let body = match params.get("query").map(String::as_str) {
        Some("{ImdbId:0133093}") => json!([
            {"title": "The.Matrix.1999.1080p", "guid": "id-1", "downloadUrl": "http://dl/1"}
        ]),
        Some("The Matrix 1999") => json!([
            {"title": "The.Matrix.1999.720p", "guid": "text-1"},
            {"title": "The.Matrix.Reloaded.2003.1080p", "guid": "text-2"},
            {"title": "The.Matrix.2021.1080p", "guid": "text-3"}
        ]),
        Some("{ImdbId:42}{Season:1}") => json!([
            {"title": "Show.S01.1080p", "guid": "pack-id"}
        ]),
        Some("Show S01") => json!([
            {"title": "Show.S01.720p", "guid": "pack-text"},
            {"title": "Show.S01E02.720p", "guid": "not-a-pack"}
        ]),
        Some("{ImdbId:42}{Season:1}{Episode:2}") => json!([
            {"title": "Show.S01E02.1080p", "guid": "ep-id"}
        ]),
        Some("Show S01E02") => json!([
            {"title": "Show.S01E02.720p", "guid": "ep-text"},
            {"title": "Show.S01E03.720p", "guid": "wrong-episode"}
        ]),
        Some(query) if query.starts_with("broken") => {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        _ => json!([]),
    };
    Json(body).into_response()
}

async fn indexer_client(api_key: &str) -> IndexerClient {
    let base = serve(Router::new().route("/api/v1/search", get(fake_indexer))).await;
    IndexerClient::new(&IndexerConfig {
        base_url: base,
        api_key: api_key.to_string(),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap()
}

fn guids(results: &[undertow_search::IndexerResult]) -> Vec<&str> {
    results.iter().map(|r| r.guid.as_str()).collect()
}

#[tokio::test]
async fn test_movie_search_keeps_id_results_and_matching_text_results() {
    let client = indexer_client("secret").await;
    let query = IndexerQuery::from_params(&IndexerParams {
        media_type: Some("movie".to_string()),
        imdb_id: Some("tt0133093".to_string()),
        title: Some("The Matrix".to_string()),
        year: Some("1999".to_string()),
        ..IndexerParams::default()
    })
    .unwrap();

    let results = client.search(&query).await;

    assert_eq!(guids(&results), vec!["id-1", "text-1"]);
    assert_eq!(results[0].link, "http://dl/1");
    assert_eq!(results[0].resolution, 1080);
}

#[tokio::test]
async fn test_episode_search_combines_packs_then_episodes() {
    let client = indexer_client("secret").await;
    let query = IndexerQuery::Episode {
        imdb_id: "42".to_string(),
        title: "Show".to_string(),
        season: 1,
        episode: 2,
    };

    let results = client.search(&query).await;

    assert_eq!(
        guids(&results),
        vec!["pack-id", "pack-text", "ep-id", "ep-text"]
    );
}

#[tokio::test]
async fn test_rejected_api_key_yields_empty_results() {
    let client = indexer_client("wrong").await;
    let query = IndexerQuery::Movie {
        imdb_id: "0133093".to_string(),
        title: "The Matrix".to_string(),
        year: "1999".to_string(),
    };

    assert!(client.search(&query).await.is_empty());
}

#[tokio::test]
async fn test_upstream_error_yields_empty_results() {
    let client = indexer_client("secret").await;
    let query = IndexerQuery::Movie {
        imdb_id: "none".to_string(),
        title: "broken".to_string(),
        year: "2000".to_string(),
    };
    assert!(client.search(&query).await.is_empty());
}

async fn fake_search(
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("api_key").map(String::as_str) != Some("k") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match kind.as_str() {
        "movie" => Json(json!({"results": [{"id": 603, "title": "The Matrix"}]})).into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn fake_movie(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let appended = params.get("append_to_response").cloned().unwrap_or_default();
    if id == "603" {
        Json(json!({"id": 603, "appended": appended})).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({"status_message": "The resource you requested could not be found."})),
        )
            .into_response()
    }
}

async fn catalog_client() -> CatalogClient {
    let router = Router::new()
        .route("/3/search/{kind}", get(fake_search))
        .route("/3/movie/{id}", get(fake_movie));
    let base = serve(router).await;

    CatalogClient::new(&CatalogConfig {
        base_url: format!("{base}/3"),
        api_key: "k".to_string(),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap()
}

#[tokio::test]
async fn test_catalog_search_tolerates_failed_half() {
    let client = catalog_client().await;

    let results = client.search("matrix").await;

    assert_eq!(results.movies.len(), 1);
    assert!(results.shows.is_empty());
}

#[tokio::test]
async fn test_catalog_relays_status_and_body() {
    let client = catalog_client().await;

    let found = client.movie("603").await.unwrap();
    assert_eq!(found.status, 200);
    let body: Value = serde_json::from_slice(&found.body).unwrap();
    assert_eq!(body["appended"], "credits,videos,images");

    let missing = client.movie("999").await.unwrap();
    assert_eq!(missing.status, 404);
}

#[tokio::test]
async fn test_unreachable_catalog_is_network_error() {
    let client = CatalogClient::new(&CatalogConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        api_key: "k".to_string(),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap();

    assert!(matches!(
        client.movie("603").await,
        Err(MediaSearchError::NetworkError { .. })
    ));
}
