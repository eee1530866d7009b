//! Source submission, swarm listing and explicit removal.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;
use undertow_core::{AddSourceRequest, EpisodeHint};

use super::error::ApiError;
use super::streaming::parse_identity;
use crate::server::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTorrentBody {
    pub source_url: String,
    pub season: Option<i64>,
    pub episode: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTorrentResponse {
    pub stream_url: String,
    pub file_name: String,
}

/// `POST /api/torrent`
///
/// Waits for metadata before answering. Server shutdown cancels the wait;
/// a client hanging up drops the pending swarm.
///
/// # Errors
/// - `ApiError` 400 - Body is not valid JSON or lacks `sourceUrl`
/// - `ApiError` 500 - Source could not be resolved
/// - `ApiError` 404 - No video file in the swarm
/// - `ApiError` 504 - Metadata did not arrive in time
pub async fn api_add_torrent(
    State(state): State<AppState>,
    body: Result<Json<AddTorrentBody>, JsonRejection>,
) -> Result<Json<AddTorrentResponse>, ApiError> {
    let Json(body) = body.map_err(|e| {
        debug!("Rejected add body: {}", e);
        ApiError::bad_request("Invalid JSON")
    })?;
    if body.source_url.trim().is_empty() {
        return Err(ApiError::bad_request("Missing sourceUrl"));
    }

    let request = AddSourceRequest {
        source_url: body.source_url,
        hint: EpisodeHint::from_request(body.season, body.episode),
    };
    let ticket = state
        .manager
        .add_source(request, state.shutdown.child_token())
        .await?;

    Ok(Json(AddTorrentResponse {
        stream_url: ticket.stream_path(),
        file_name: ticket.file_name,
    }))
}

/// `GET /api/torrents`
pub async fn api_torrents(State(state): State<AppState>) -> Json<Value> {
    let torrents = state.manager.list_swarms().await;
    Json(json!({
        "total": torrents.len(),
        "torrents": torrents,
    }))
}

/// `DELETE /api/torrent/{identity}`
///
/// # Errors
/// - `ApiError` 400 - Malformed identity
/// - `ApiError` 404 - No such swarm
pub async fn api_remove_torrent(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<StatusCode, ApiError> {
    let info_hash = parse_identity(&identity)?;
    state.manager.remove_swarm(info_hash).await?;
    Ok(StatusCode::NO_CONTENT)
}
