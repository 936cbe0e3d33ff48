use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an uploaded video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    /// Upload received, encryption in progress
    Processing,
    /// Blob committed; streamable
    Ready,
    /// Encryption failed; the blob must not be served
    Error,
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VideoStatus::Processing => "processing",
            VideoStatus::Ready => "ready",
            VideoStatus::Error => "error",
        })
    }
}

/// A stored video and the key material needed to stream it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: u64,
    /// Blob file name inside the upload directory
    pub filename: String,
    pub original_filename: String,
    /// Base64 AES-256 key
    pub encryption_key: String,
    /// Base64 CBC initialization vector
    pub iv: String,
    pub content_type: String,
    /// Plaintext size in bytes (without cipher padding)
    pub file_size: u64,
    /// Ciphertext size in bytes, always a multiple of 16
    pub blob_len: u64,
    /// Unix timestamp (seconds) of the upload
    pub uploaded_at: u64,
    pub status: VideoStatus,
}

/// Public view of a record. Never carries key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub id: u64,
    pub original_filename: String,
    pub content_type: String,
    pub file_size: u64,
    pub uploaded_at: u64,
    pub status: VideoStatus,
}

impl VideoRecord {
    pub fn summary(&self) -> VideoSummary {
        VideoSummary {
            id: self.id,
            original_filename: self.original_filename.clone(),
            content_type: self.content_type.clone(),
            file_size: self.file_size,
            uploaded_at: self.uploaded_at,
            status: self.status,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == VideoStatus::Ready
    }
}

/// Current unix timestamp in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> VideoRecord {
        VideoRecord {
            id: 7,
            filename: "encrypted_1_clip.mp4".into(),
            original_filename: "clip.mp4".into(),
            encryption_key: "a2V5".into(),
            iv: "aXY=".into(),
            content_type: "video/mp4".into(),
            file_size: 1000,
            blob_len: 1008,
            uploaded_at: 1_700_000_000,
            status: VideoStatus::Ready,
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&VideoStatus::Processing).unwrap(),
            "\"processing\""
        );
        let parsed: VideoStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(parsed, VideoStatus::Ready);
        assert_eq!(VideoStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_summary_omits_key_material() {
        let summary = record().summary();
        assert_eq!(summary.id, 7);
        assert_eq!(summary.file_size, 1000);
        let rendered = serde_json::to_string(&summary).unwrap();
        assert!(!rendered.contains("a2V5"));
        assert!(!rendered.contains("aXY="));
    }

    #[test]
    fn test_is_ready() {
        let mut r = record();
        assert!(r.is_ready());
        r.status = VideoStatus::Processing;
        assert!(!r.is_ready());
    }
}
