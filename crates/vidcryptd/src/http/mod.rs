//! HTTP API
//!
//! Routes:
//!   GET    /api/videos                      list uploaded videos
//!   POST   /api/videos/upload               multipart upload (field `video`)
//!   DELETE /api/videos/{id}                 remove blob and record
//!   GET    /api/videos/stream/{id}          decrypted (range) stream
//!   GET    /api/videos/stream/{id}/events   progress events (SSE)

mod events;
pub mod range;
mod stream;
mod videos;

use axum::extract::DefaultBodyLimit;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{middleware, Json, Router};
use std::sync::Arc;
use tokio::sync::RwLock;

use vidcrypt_catalog::Catalog;
use vidcrypt_core::config::VidcryptConfig;
use vidcrypt_core::VidcryptError;
use vidcrypt_events::EventChannel;

use crate::metrics::Metrics;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VidcryptConfig>,
    pub catalog: Arc<RwLock<Catalog>>,
    pub events: EventChannel,
    pub metrics: Metrics,
}

pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.upload.max_upload_mb.saturating_mul(1024 * 1024))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/api/videos", get(videos::list_videos))
        .route("/api/videos/upload", post(videos::upload_video))
        .route("/api/videos/{id}", delete(videos::delete_video))
        .route("/api/videos/stream/{id}", get(stream::stream_video))
        .route("/api/videos/stream/{id}/events", get(events::video_events))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .entry(ACCESS_CONTROL_ALLOW_ORIGIN)
        .or_insert(HeaderValue::from_static("*"));
    response
}

/// Handler error, rendered as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<VidcryptError> for ApiError {
    fn from(e: VidcryptError) -> Self {
        match e {
            VidcryptError::NotFound(_) => ApiError::NotFound("Video not found".into()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{e:#}"))
    }
}
