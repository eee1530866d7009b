//! Byte-range streaming of one file of a swarm.

use std::io::SeekFrom;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use undertow_core::InfoHash;

use super::error::ApiError;
use super::range::RangeRequest;
use crate::server::AppState;

/// Parses the `{identity}` path segment.
///
/// # Errors
/// - `ApiError` 400 - Not a 40 character hex info hash
pub fn parse_identity(identity: &str) -> Result<InfoHash, ApiError> {
    InfoHash::from_hex(identity).map_err(|_| ApiError::bad_request("Invalid infohash"))
}

/// `GET /api/stream/{identity}/{fileIndex}`
///
/// Serves the file with range support. The reader is released when the
/// body finishes or the client goes away; the swarm itself stays.
///
/// # Errors
/// - `ApiError` 400 - Malformed identity or index
/// - `ApiError` 404 - Unknown swarm or index out of range
pub async fn stream_file(
    State(state): State<AppState>,
    Path((identity, file_index)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let info_hash = parse_identity(&identity)?;
    let file_index: usize = file_index
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid file index"))?;

    let opened = state.manager.open_stream(info_hash, file_index).await?;
    let total_size = opened.file.length;
    let content_type = mime_guess::from_path(&opened.file.path)
        .first_or_octet_stream()
        .to_string();

    let range = RangeRequest::from_headers(&headers, total_size);
    info!("Serving {} ({:?})", opened.file.path, range);

    let builder = Response::builder()
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_TYPE, content_type);

    let (builder, start) = match range {
        RangeRequest::Unsatisfiable => {
            return builder
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(CONTENT_RANGE, format!("bytes */{total_size}"))
                .body(Body::empty())
                .map_err(internal);
        }
        RangeRequest::Full => (builder.status(StatusCode::OK), 0),
        RangeRequest::Partial { start, end } => (
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(CONTENT_RANGE, format!("bytes {start}-{end}/{total_size}")),
            start,
        ),
    };

    let length = range.content_length(total_size);
    let mut reader = opened.reader;
    if start > 0 {
        reader
            .seek(SeekFrom::Start(start))
            .await
            .map_err(internal)?;
    }
    debug!("Streaming {} bytes from offset {}", length, start);

    builder
        .header(CONTENT_LENGTH, length)
        .body(Body::from_stream(ReaderStream::new(reader.take(length))))
        .map_err(internal)
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
