//! GET /api/videos/stream/{id}
//!
//! The blob is decrypted on the blocking pool one read at a time and handed
//! to the response body through a channel of capacity 1, so at most two
//! decrypted buffers exist per request. A client that goes away drops the
//! receiver, which ends the blocking loop on its next send.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS,
    CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA, RANGE,
};
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use std::fs::File;
use std::io;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, warn};

use vidcrypt_crypto::{decode_range, CodecError, KeyMaterial, RangeDecoder};

use super::{range, ApiError, AppState};
use crate::metrics::Metrics;

pub async fn stream_video(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // Clone the record so the catalog lock is released before any blob I/O
    let record = state
        .catalog
        .read()
        .await
        .get(id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound("Video not found".into()))?;

    if !record.is_ready() {
        return Err(ApiError::BadRequest(
            "Video is not ready for streaming".into(),
        ));
    }

    let path = state.config.storage.upload_dir.join(&record.filename);
    debug!(
        video_id = id,
        original = %record.original_filename,
        path = %path.display(),
        content_type = %record.content_type,
        "streaming video"
    );

    let file_size = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!(video_id = id, path = %path.display(), "video file not found");
            return Err(ApiError::NotFound("Video file not found".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let keys = KeyMaterial::decode(&record.encryption_key, &record.iv)
        .map_err(|e| ApiError::Internal(format!("video {id}: {e}")))?;

    let range_header = headers.get(RANGE).and_then(|v| v.to_str().ok());
    let plan = range::plan(range_header, file_size);
    if let Some(value) = range_header {
        debug!(
            video_id = id,
            range = value,
            start = plan.start,
            length = plan.length,
            partial = plan.is_partial(),
            "range request"
        );
    }

    let body = if plan.length == 0 {
        Body::empty()
    } else {
        let (start, length) = (plan.start, plan.length);
        let read_size = state.config.stream.read_size;
        let decoder = tokio::task::spawn_blocking(move || {
            decode_range(&path, keys, start, length).map(|d| d.with_read_size(read_size))
        })
        .await
        .map_err(|e| ApiError::Internal(format!("opening blob: {e}")))?
        .map_err(|e| match e {
            CodecError::BlobNotFound(_) => ApiError::NotFound("Video file not found".into()),
            e => ApiError::Internal(e.to_string()),
        })?;
        stream_body(decoder, state.metrics.clone(), id)
    };

    state.metrics.stream_started(plan.is_partial());

    let mut builder = Response::builder()
        .status(plan.status)
        .header(CONTENT_TYPE, &record.content_type);
    for (name, value) in plan.headers {
        builder = builder.header(name, value);
    }
    builder
        .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(PRAGMA, "no-cache")
        .header(EXPIRES, "0")
        .header(ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(ACCESS_CONTROL_ALLOW_HEADERS, "Range")
        .header(ACCESS_CONTROL_EXPOSE_HEADERS, "Content-Range, Content-Length")
        .body(body)
        .map_err(|e| ApiError::Internal(format!("building stream response: {e}")))
}

/// Drive `decoder` on the blocking pool and expose its buffers as a body.
fn stream_body(mut decoder: RangeDecoder<File>, metrics: Metrics, video_id: u64) -> Body {
    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(1);

    tokio::task::spawn_blocking(move || {
        let mut sent: u64 = 0;
        for buf in decoder.by_ref() {
            let len = buf.len() as u64;
            if tx.blocking_send(Ok(Bytes::from(buf))).is_err() {
                debug!(video_id, sent, "client went away, stopping stream");
                return;
            }
            sent += len;
            metrics.bytes_streamed.inc_by(len);
        }

        if decoder.is_truncated() {
            metrics.truncations.inc();
            warn!(
                video_id,
                sent,
                missing = decoder.remaining(),
                "stream truncated"
            );
        } else {
            debug!(video_id, sent, "stream complete");
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}
