//! Progress events for uploaded videos.
//!
//! An [`EventChannel`] is created once at daemon startup, handed to the HTTP
//! layer, and closed on shutdown. Two backends:
//!
//!   - **NATS** (feature `nats`): core pub/sub, subject `<prefix>.<video_id>`
//!   - **Local**: a `tokio::sync::broadcast` channel inside the process
//!
//! Publishing never fails the caller: delivery problems are logged and the
//! upload or stream carries on.

use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use vidcrypt_core::config::EventsConfig;
use vidcrypt_core::types::{unix_now, VideoStatus};

/// Capacity of the in-process broadcast buffer
const LOCAL_CAPACITY: usize = 256;

// ── VideoEvent ────────────────────────────────────────────────────────────

/// A progress notification for one video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEvent {
    pub video_id: u64,
    pub status: VideoStatus,
    pub message: String,
    pub timestamp: u64,
}

impl VideoEvent {
    pub fn new(video_id: u64, status: VideoStatus, message: impl Into<String>) -> Self {
        Self {
            video_id,
            status,
            message: message.into(),
            timestamp: unix_now(),
        }
    }

    pub fn to_bytes(&self) -> Result<bytes::Bytes> {
        let json = serde_json::to_vec(self)
            .map_err(|e| anyhow::anyhow!("serializing VideoEvent: {e}"))?;
        Ok(bytes::Bytes::from(json))
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| anyhow::anyhow!("deserializing VideoEvent: {e}"))
    }
}

// ── EventChannel ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum EventChannel {
    #[cfg(feature = "nats")]
    Nats(NatsEvents),
    Local(LocalEvents),
}

impl EventChannel {
    /// Connect the configured backend.
    ///
    /// Uses NATS when `nats_url` is set and the server answers; otherwise
    /// falls back to the in-process channel so uploads are never blocked on
    /// a missing broker.
    pub async fn connect(config: &EventsConfig) -> Self {
        match config.nats_url.as_deref() {
            #[cfg(feature = "nats")]
            Some(url) => match NatsEvents::connect(url, &config.subject_prefix).await {
                Ok(nats) => EventChannel::Nats(nats),
                Err(e) => {
                    warn!("event channel: {e}  (falling back to in-process events)");
                    EventChannel::local()
                }
            },
            #[cfg(not(feature = "nats"))]
            Some(url) => {
                warn!(url, "event channel: built without the nats feature, using in-process events");
                EventChannel::local()
            }
            None => {
                info!("event channel: in-process");
                EventChannel::local()
            }
        }
    }

    pub fn local() -> Self {
        EventChannel::Local(LocalEvents::new())
    }

    pub fn backend(&self) -> &'static str {
        match self {
            #[cfg(feature = "nats")]
            EventChannel::Nats(_) => "nats",
            EventChannel::Local(_) => "local",
        }
    }

    /// Publish an event. Failures are logged, not returned.
    pub async fn publish(&self, event: &VideoEvent) {
        let result = match self {
            #[cfg(feature = "nats")]
            EventChannel::Nats(nats) => nats.publish(event).await,
            EventChannel::Local(local) => {
                local.publish(event);
                Ok(())
            }
        };
        match result {
            Ok(()) => debug!(
                video_id = event.video_id,
                status = %event.status,
                "event published"
            ),
            Err(e) => warn!(video_id = event.video_id, "event publish failed: {e}"),
        }
    }

    /// Stream of events for one video, starting from now.
    pub async fn subscribe(&self, video_id: u64) -> Result<BoxStream<'static, VideoEvent>> {
        match self {
            #[cfg(feature = "nats")]
            EventChannel::Nats(nats) => nats.subscribe(video_id).await,
            EventChannel::Local(local) => Ok(local.subscribe(video_id)),
        }
    }

    /// Flush pending publishes before shutdown.
    pub async fn close(&self) {
        match self {
            #[cfg(feature = "nats")]
            EventChannel::Nats(nats) => {
                if let Err(e) = nats.client.flush().await {
                    warn!("event channel: flush on close failed: {e}");
                }
                info!("event channel: NATS closed");
            }
            EventChannel::Local(_) => debug!("event channel: in-process closed"),
        }
    }
}

// ── Local backend ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct LocalEvents {
    tx: broadcast::Sender<VideoEvent>,
}

impl LocalEvents {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(LOCAL_CAPACITY);
        Self { tx }
    }

    fn publish(&self, event: &VideoEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event.clone());
    }

    fn subscribe(&self, video_id: u64) -> BoxStream<'static, VideoEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(move |item| async move {
                match item {
                    Ok(event) if event.video_id == video_id => Some(event),
                    Ok(_) => None,
                    Err(e) => {
                        warn!(video_id, "event subscriber lagged: {e}");
                        None
                    }
                }
            })
            .boxed()
    }
}

// ── NATS backend ──────────────────────────────────────────────────────────

#[cfg(feature = "nats")]
pub use nats::NatsEvents;

#[cfg(feature = "nats")]
mod nats {
    use super::*;

    /// Thin wrapper around an async-nats client.
    #[derive(Clone)]
    pub struct NatsEvents {
        pub(crate) client: async_nats::Client,
        prefix: String,
    }

    impl NatsEvents {
        pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
            let client = async_nats::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("connecting to NATS at {url}: {e}"))?;
            info!("NATS: connected to {url}");
            Ok(NatsEvents {
                client,
                prefix: prefix.to_string(),
            })
        }

        pub fn subject(&self, video_id: u64) -> String {
            format!("{}.{video_id}", self.prefix)
        }

        pub async fn publish(&self, event: &VideoEvent) -> Result<()> {
            let payload = event.to_bytes()?;
            self.client
                .publish(self.subject(event.video_id), payload)
                .await
                .map_err(|e| anyhow::anyhow!("publishing video event: {e}"))
        }

        pub async fn subscribe(&self, video_id: u64) -> Result<BoxStream<'static, VideoEvent>> {
            let subject = self.subject(video_id);
            let subscriber = self
                .client
                .subscribe(subject.clone())
                .await
                .map_err(|e| anyhow::anyhow!("subscribing to {subject}: {e}"))?;

            Ok(subscriber
                .filter_map(|msg| async move {
                    match VideoEvent::from_bytes(&msg.payload) {
                        Ok(event) => Some(event),
                        Err(e) => {
                            warn!("dropping malformed event: {e}");
                            None
                        }
                    }
                })
                .boxed())
        }
    }
}
