//! Catalog proxy routes for the player UI.

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use serde::Deserialize;
use undertow_search::{CatalogResponse, CatalogSearch};

use super::error::ApiError;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CatalogParams {
    pub id: Option<String>,
    pub season: Option<String>,
    pub episode: Option<String>,
}

impl CatalogParams {
    fn id(&self) -> Result<&str, ApiError> {
        present(&self.id)
    }

    fn season(&self) -> Result<&str, ApiError> {
        present(&self.season)
    }

    fn episode(&self) -> Result<&str, ApiError> {
        present(&self.episode)
    }
}

fn present(value: &Option<String>) -> Result<&str, ApiError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required parameters"))
}

/// Passes the upstream status and JSON body through unchanged.
fn relay(response: CatalogResponse) -> Result<Response, ApiError> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(response.body))
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// `GET /api/search?q=`
pub async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Json<CatalogSearch> {
    Json(state.catalog.search(params.q.trim()).await)
}

/// `GET /api/movie?id=`
///
/// # Errors
/// - `ApiError` 400 - Missing id
/// - `ApiError` 502 - Catalog unreachable
pub async fn api_movie(
    State(state): State<AppState>,
    Query(params): Query<CatalogParams>,
) -> Result<Response, ApiError> {
    relay(state.catalog.movie(params.id()?).await?)
}

/// `GET /api/show?id=`
///
/// # Errors
/// - `ApiError` 400 - Missing id
/// - `ApiError` 502 - Catalog unreachable
pub async fn api_show(
    State(state): State<AppState>,
    Query(params): Query<CatalogParams>,
) -> Result<Response, ApiError> {
    relay(state.catalog.show(params.id()?).await?)
}

/// `GET /api/season?id=&season=`
///
/// # Errors
/// - `ApiError` 400 - Missing id or season
/// - `ApiError` 502 - Catalog unreachable
pub async fn api_season(
    State(state): State<AppState>,
    Query(params): Query<CatalogParams>,
) -> Result<Response, ApiError> {
    let response = state
        .catalog
        .season(params.id()?, params.season()?)
        .await?;
    relay(response)
}

/// `GET /api/episode?id=&season=&episode=`
///
/// # Errors
/// - `ApiError` 400 - Missing id, season or episode
/// - `ApiError` 502 - Catalog unreachable
pub async fn api_episode(
    State(state): State<AppState>,
    Query(params): Query<CatalogParams>,
) -> Result<Response, ApiError> {
    let response = state
        .catalog
        .episode(params.id()?, params.season()?, params.episode()?)
        .await?;
    relay(response)
}
