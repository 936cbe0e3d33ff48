//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  Prometheus text format
//!   GET /healthz  Liveness probe (always 200 if process is running)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::{counter::Counter, family::Family};
use prometheus_client::registry::Registry;
use std::sync::Arc;

type Labels = Vec<(String, String)>;

/// Counters shared by the HTTP handlers
#[derive(Clone, Default)]
pub struct Metrics {
    streams: Family<Labels, Counter>,
    pub bytes_streamed: Counter,
    pub truncations: Counter,
    uploads: Family<Labels, Counter>,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "vidcrypt_streams",
            "Stream responses started, by kind (full or partial)",
            metrics.streams.clone(),
        );
        registry.register(
            "vidcrypt_stream_bytes",
            "Decrypted bytes handed to stream responses",
            metrics.bytes_streamed.clone(),
        );
        registry.register(
            "vidcrypt_stream_truncations",
            "Streams that ended early on a read or decrypt failure",
            metrics.truncations.clone(),
        );
        registry.register(
            "vidcrypt_uploads",
            "Completed upload requests, by outcome",
            metrics.uploads.clone(),
        );
        metrics
    }

    pub fn stream_started(&self, partial: bool) {
        let kind = if partial { "partial" } else { "full" };
        self.streams
            .get_or_create(&vec![("kind".to_string(), kind.to_string())])
            .inc();
    }

    pub fn upload_finished(&self, outcome: &str) {
        self.uploads
            .get_or_create(&vec![("outcome".to_string(), outcome.to_string())])
            .inc();
    }

    #[cfg(test)]
    pub fn streams_started(&self, kind: &str) -> u64 {
        self.streams
            .get_or_create(&vec![("kind".to_string(), kind.to_string())])
            .get()
    }

    #[cfg(test)]
    pub fn uploads_finished(&self, outcome: &str) -> u64 {
        self.uploads
            .get_or_create(&vec![("outcome".to_string(), outcome.to_string())])
            .get()
    }
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9100")
pub async fn serve(addr: String, registry: Arc<Registry>) -> Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(registry);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz");

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
