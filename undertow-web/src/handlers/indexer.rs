//! Release search route.

use axum::Json;
use axum::extract::{Query, State};
use undertow_search::{IndexerParams, IndexerQuery, IndexerResult};

use super::error::ApiError;
use crate::server::AppState;

/// `GET /api/indexer?type=movie|episode&imdbId=&title=&year=&season=&episode=`
///
/// # Errors
/// - `ApiError` 400 - Missing or invalid parameters
pub async fn api_indexer(
    State(state): State<AppState>,
    Query(params): Query<IndexerParams>,
) -> Result<Json<Vec<IndexerResult>>, ApiError> {
    let query = IndexerQuery::from_params(&params)?;
    Ok(Json(state.indexer.search(&query).await))
}
