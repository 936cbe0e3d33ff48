use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VidcryptError, VidcryptResult};

/// Top-level daemon configuration (loaded from vidcrypt.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VidcryptConfig {
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
    pub stream: StreamConfig,
    pub upload: UploadConfig,
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP API listen address (default: 0.0.0.0:5000)
    pub listen: String,
    /// Prometheus metrics endpoint (default: 127.0.0.1:9100)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding encrypted blobs and in-flight uploads
    pub upload_dir: PathBuf,
    /// JSON catalog of video records
    pub catalog_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Bytes read from the blob per decrypted buffer (default: 1 MiB).
    /// Must be a non-zero multiple of the cipher block size.
    pub read_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Accepted file extensions, lowercase, without the dot
    pub allowed_extensions: Vec<String>,
    /// Maximum multipart request body in MiB
    pub max_upload_mb: u64,
}

/// Progress event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// NATS endpoint; when unset events stay in-process
    pub nats_url: Option<String>,
    /// Subject prefix, events go to `<prefix>.<video_id>`
    pub subject_prefix: String,
}

impl VidcryptConfig {
    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> VidcryptResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VidcryptError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VidcryptResult<()> {
        if self.stream.read_size == 0 || self.stream.read_size % 16 != 0 {
            return Err(VidcryptError::Config(format!(
                "stream.read_size must be a non-zero multiple of 16, got {}",
                self.stream.read_size
            )));
        }
        if self.upload.allowed_extensions.is_empty() {
            return Err(VidcryptError::Config(
                "upload.allowed_extensions must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".into(),
            metrics_addr: Some("127.0.0.1:9100".into()),
            log_level: "info".into(),
            log_format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("./uploads"),
            catalog_path: PathBuf::from("./uploads/catalog.json"),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            read_size: 1024 * 1024,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: ["mp4", "avi", "mov", "mkv"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_upload_mb: 2048,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            subject_prefix: "video-stream".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[daemon]
listen = "127.0.0.1:8080"
metrics_addr = "127.0.0.1:9200"
log_level = "debug"
log_format = "json"

[storage]
upload_dir = "/var/lib/vidcrypt"
catalog_path = "/var/lib/vidcrypt/catalog.json"

[stream]
read_size = 65536

[upload]
allowed_extensions = ["mp4", "webm"]
max_upload_mb = 512

[events]
nats_url = "nats://nats.example.com:4222"
subject_prefix = "videos"
"#;
        let config: VidcryptConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.daemon.listen, "127.0.0.1:8080");
        assert_eq!(config.daemon.log_format, "json");
        assert_eq!(config.storage.upload_dir, PathBuf::from("/var/lib/vidcrypt"));
        assert_eq!(config.stream.read_size, 65536);
        assert_eq!(config.upload.allowed_extensions, vec!["mp4", "webm"]);
        assert_eq!(config.upload.max_upload_mb, 512);
        assert_eq!(
            config.events.nats_url.as_deref(),
            Some("nats://nats.example.com:4222")
        );
        assert_eq!(config.events.subject_prefix, "videos");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_defaults() {
        let config: VidcryptConfig = toml::from_str("").unwrap();

        assert_eq!(config.daemon.listen, "0.0.0.0:5000");
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.stream.read_size, 1024 * 1024);
        assert_eq!(config.upload.allowed_extensions.len(), 4);
        assert!(config.events.nats_url.is_none());
        assert_eq!(config.events.subject_prefix, "video-stream");
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[storage]
upload_dir = "/srv/videos"
"#;
        let config: VidcryptConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.storage.upload_dir, PathBuf::from("/srv/videos"));
        // Defaults
        assert_eq!(
            config.storage.catalog_path,
            PathBuf::from("./uploads/catalog.json")
        );
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_unaligned_read_size_rejected() {
        let mut config = VidcryptConfig::default();
        config.stream.read_size = 1000;
        assert!(matches!(config.validate(), Err(VidcryptError::Config(_))));

        config.stream.read_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = VidcryptConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.daemon.listen, "0.0.0.0:5000");
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vidcrypt.toml");
        std::fs::write(&path, "[stream]\nread_size = 4096\n").unwrap();

        let config = VidcryptConfig::load(&path).unwrap();
        assert_eq!(config.stream.read_size, 4096);

        std::fs::write(&path, "[stream]\nread_size = 100\n").unwrap();
        assert!(VidcryptConfig::load(&path).is_err());
    }
}
