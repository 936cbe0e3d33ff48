//! Daemon lifecycle: startup, metrics endpoint, HTTP API, graceful shutdown

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use vidcrypt_catalog::Catalog;
use vidcrypt_core::config::VidcryptConfig;
use vidcrypt_events::EventChannel;

use crate::http::{self, AppState};
use crate::metrics::Metrics;

pub async fn run(config: VidcryptConfig) -> Result<()> {
    info!("daemon starting");

    let upload_dir = &config.storage.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .with_context(|| format!("creating upload dir: {}", upload_dir.display()))?;

    let catalog = Catalog::open(&config.storage.catalog_path)?;
    info!(
        path = %config.storage.catalog_path.display(),
        videos = catalog.len(),
        "catalog loaded"
    );

    let events = EventChannel::connect(&config.events).await;
    info!(backend = events.backend(), "event channel ready");

    // Start Prometheus metrics endpoint
    let mut registry = Registry::default();
    let metrics = Metrics::new(&mut registry);
    if let Some(addr) = config.daemon.metrics_addr.clone() {
        let registry = Arc::new(registry);
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, registry).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    let listen = config.daemon.listen.clone();
    let state = AppState {
        config: Arc::new(config),
        catalog: Arc::new(RwLock::new(catalog)),
        events: events.clone(),
        metrics,
    };
    let app = http::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("HTTP bind {listen}"))?;
    info!(addr = %listen, "HTTP: listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server")?;

    info!("shutting down");
    events.close().await;
    if let Err(e) = state.catalog.write().await.flush() {
        warn!("catalog flush on shutdown failed: {e:#}");
    }
    info!("daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("SIGINT handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
