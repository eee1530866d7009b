//! HTTP Range request handling for video streaming
//!
//! Implements the single-range subset of RFC 7233 that media players use:
//! `bytes=a-b`, `bytes=a-` and `bytes=-n`.

use axum::http::HeaderMap;
use axum::http::header::RANGE;

/// What a request's Range header asks for, resolved against a file length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable Range header; serve the whole file with 200
    Full,
    /// Inclusive byte range to serve with 206
    Partial { start: u64, end: u64 },
    /// Nothing in the file satisfies the range; answer 416
    Unsatisfiable,
}

impl RangeRequest {
    /// Reads the Range header of `headers` against a file of `total_size` bytes.
    pub fn from_headers(headers: &HeaderMap, total_size: u64) -> Self {
        match headers.get(RANGE).and_then(|value| value.to_str().ok()) {
            Some(range) => parse_range_header(range, total_size),
            None => RangeRequest::Full,
        }
    }

    /// Number of bytes the response body carries.
    pub fn content_length(&self, total_size: u64) -> u64 {
        match self {
            RangeRequest::Full => total_size,
            RangeRequest::Partial { start, end } => end - start + 1,
            RangeRequest::Unsatisfiable => 0,
        }
    }
}

/// Parses a Range header value.
///
/// Headers in another unit are ignored and yield [`RangeRequest::Full`]. Of a
/// multi-range list only the first range is honoured. The end of a range is
/// clamped to the last byte of the file.
///
/// # Examples
/// ```
/// use undertow_web::handlers::range::{RangeRequest, parse_range_header};
/// assert_eq!(
///     parse_range_header("bytes=100-199", 1000),
///     RangeRequest::Partial { start: 100, end: 199 }
/// );
/// ```
pub fn parse_range_header(range: &str, total_size: u64) -> RangeRequest {
    let Some(ranges) = range.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    let first = ranges.split(',').next().unwrap_or_default().trim();
    let Some((start_str, end_str)) = first.split_once('-') else {
        return RangeRequest::Unsatisfiable;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if total_size == 0 {
        return RangeRequest::Unsatisfiable;
    }
    let last = total_size - 1;

    if start_str.is_empty() {
        // Suffix range: the final n bytes.
        return match end_str.parse::<u64>() {
            Ok(0) | Err(_) => RangeRequest::Unsatisfiable,
            Ok(suffix) => RangeRequest::Partial {
                start: total_size.saturating_sub(suffix),
                end: last,
            },
        };
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeRequest::Unsatisfiable;
    };
    if start > last {
        return RangeRequest::Unsatisfiable;
    }

    let end = if end_str.is_empty() {
        last
    } else {
        match end_str.parse::<u64>() {
            Ok(end) if end >= start => end.min(last),
            _ => return RangeRequest::Unsatisfiable,
        }
    };

    RangeRequest::Partial { start, end }
}
