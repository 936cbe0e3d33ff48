//! GET /api/videos/stream/{id}/events: Server-Sent Events, one `data:` line
//! of JSON per [`VideoEvent`](vidcrypt_events::VideoEvent) for that video.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use tracing::debug;

use super::{ApiError, AppState};

pub async fn video_events(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let events = state.events.subscribe(id).await?;
    debug!(video_id = id, backend = state.events.backend(), "event subscriber attached");

    let stream = events.map(|event| Event::default().json_data(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
