//! `Range: bytes=<start>-<end>` handling for the stream endpoint.
//!
//! Only the first range of a `bytes` header is honoured. Anything that cannot
//! be served as a single satisfiable range (bad syntax, suffix ranges, other
//! units, `start > end`, an empty blob) is answered with the whole blob.

use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE};
use axum::http::{HeaderName, StatusCode};

/// What the stream handler should send for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    pub status: StatusCode,
    pub start: u64,
    pub length: u64,
    pub headers: Vec<(HeaderName, String)>,
}

impl RangePlan {
    pub fn is_partial(&self) -> bool {
        self.status == StatusCode::PARTIAL_CONTENT
    }

    fn full(file_size: u64) -> Self {
        Self {
            status: StatusCode::OK,
            start: 0,
            length: file_size,
            headers: vec![
                (ACCEPT_RANGES, "bytes".into()),
                (CONTENT_LENGTH, file_size.to_string()),
            ],
        }
    }

    fn partial(start: u64, end: u64, file_size: u64) -> Self {
        let length = end - start + 1;
        Self {
            status: StatusCode::PARTIAL_CONTENT,
            start,
            length,
            headers: vec![
                (ACCEPT_RANGES, "bytes".into()),
                (CONTENT_RANGE, format!("bytes {start}-{end}/{file_size}")),
                (CONTENT_LENGTH, length.to_string()),
            ],
        }
    }
}

/// Decide status, byte window and headers for a blob of `file_size` bytes.
pub fn plan(range_header: Option<&str>, file_size: u64) -> RangePlan {
    let Some((start, end)) = range_header.and_then(parse_range_header) else {
        return RangePlan::full(file_size);
    };
    if file_size == 0 {
        return RangePlan::full(file_size);
    }

    let end = end.unwrap_or(file_size - 1).min(file_size - 1);
    if start > end {
        return RangePlan::full(file_size);
    }
    RangePlan::partial(start, end, file_size)
}

/// Parse the first `first-last` / `first-` range of a `bytes` Range header.
fn parse_range_header(value: &str) -> Option<(u64, Option<u64>)> {
    let (unit, rest) = value.trim().split_once('=')?;
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return None;
    }

    let first = rest.split(',').next()?.trim();
    let (start, end) = first.split_once('-')?;
    let start = parse_u64(start)?;
    let end = match end.trim() {
        "" => None,
        end => Some(parse_u64(end)?),
    };
    Some((start, end))
}

fn parse_u64(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
