//! Router assembly and the HTTP server loop.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::{delete, get, post};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;
use undertow_core::config::ServerConfig;
use undertow_core::{SwarmManager, UndertowError};
use undertow_search::{CatalogClient, IndexerClient};

use crate::handlers::{
    api_add_torrent, api_episode, api_indexer, api_movie, api_remove_torrent, api_search,
    api_season, api_show, api_torrents, stream_file,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: SwarmManager,
    pub catalog: CatalogClient,
    pub indexer: IndexerClient,
    /// Cancelled on shutdown; pending metadata waits hang off it
    pub shutdown: CancellationToken,
}

/// Builds the full application router.
///
/// With a static directory, unknown paths fall back to its `index.html`.
pub fn build_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/api/torrent", post(api_add_torrent))
        .route("/api/torrent/{identity}", delete(api_remove_torrent))
        .route("/api/torrents", get(api_torrents))
        .route("/api/stream/{identity}/{file_index}", get(stream_file))
        .route("/api/search", get(api_search))
        .route("/api/movie", get(api_movie))
        .route("/api/show", get(api_show))
        .route("/api/season", get(api_season))
        .route("/api/episode", get(api_episode))
        .route("/api/indexer", get(api_indexer));

    let router = match static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => router,
    };

    router
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-embedder-policy"),
            HeaderValue::from_static("credentialless"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API until `state.shutdown` is cancelled.
///
/// # Errors
/// - `UndertowError::Io` - Listener could not bind
/// - `UndertowError::Server` - Server loop failed
pub async fn run_server(config: &ServerConfig, state: AppState) -> Result<(), UndertowError> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state, config.static_dir.as_deref());

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Undertow listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| UndertowError::Server {
            reason: e.to_string(),
        })?;

    info!("Server stopped");
    Ok(())
}
