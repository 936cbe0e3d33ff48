//! vidcrypt-catalog: the persisted list of uploaded videos.
//!
//! Records are loaded entirely into memory and flushed atomically to a JSON
//! file (write temp, then rename). Ids are assigned in increasing order and
//! never reused, even after deletion.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vidcrypt_core::types::{unix_now, VideoRecord, VideoStatus};
use vidcrypt_core::{VidcryptError, VidcryptResult};

/// Fields supplied by the uploader; the catalog fills in id and timestamp.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub filename: String,
    pub original_filename: String,
    pub encryption_key: String,
    pub iv: String,
    pub content_type: String,
    pub file_size: u64,
    pub blob_len: u64,
    pub status: VideoStatus,
}

/// On-disk layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    next_id: u64,
    videos: Vec<VideoRecord>,
}

/// In-memory catalog, persisted to a JSON file
pub struct Catalog {
    path: PathBuf,
    next_id: u64,
    videos: BTreeMap<u64, VideoRecord>,
    dirty: bool,
}

impl Catalog {
    /// Load or create a catalog at the given path.
    /// If the file doesn't exist, starts empty.
    pub fn open(path: &Path) -> Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading catalog: {}", path.display()))?;
            serde_json::from_str::<CatalogFile>(&content)
                .with_context(|| format!("parsing catalog: {}", path.display()))?
        } else {
            CatalogFile::default()
        };

        let videos: BTreeMap<u64, VideoRecord> =
            file.videos.into_iter().map(|v| (v.id, v)).collect();
        let max_id = videos.keys().next_back().copied().unwrap_or(0);

        Ok(Catalog {
            path: path.to_path_buf(),
            next_id: file.next_id.max(max_id + 1),
            videos,
            dirty: false,
        })
    }

    /// Id the next `insert` will assign.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Insert a new record, assigning the next id.
    pub fn insert(&mut self, new: NewVideo) -> VideoRecord {
        let id = self.next_id;
        self.next_id += 1;

        let record = VideoRecord {
            id,
            filename: new.filename,
            original_filename: new.original_filename,
            encryption_key: new.encryption_key,
            iv: new.iv,
            content_type: new.content_type,
            file_size: new.file_size,
            blob_len: new.blob_len,
            uploaded_at: unix_now(),
            status: new.status,
        };
        self.videos.insert(id, record.clone());
        self.dirty = true;
        record
    }

    pub fn get(&self, id: u64) -> Option<&VideoRecord> {
        self.videos.get(&id)
    }

    /// Replace an existing record (matched by id).
    pub fn update(&mut self, record: VideoRecord) -> VidcryptResult<()> {
        match self.videos.get_mut(&record.id) {
            Some(slot) => {
                *slot = record;
                self.dirty = true;
                Ok(())
            }
            None => Err(VidcryptError::NotFound(record.id)),
        }
    }

    pub fn set_status(&mut self, id: u64, status: VideoStatus) -> VidcryptResult<()> {
        let record = self.videos.get_mut(&id).ok_or(VidcryptError::NotFound(id))?;
        record.status = status;
        self.dirty = true;
        Ok(())
    }

    /// All records in ascending id order.
    pub fn list(&self) -> Vec<&VideoRecord> {
        self.videos.values().collect()
    }

    pub fn remove(&mut self, id: u64) -> Option<VideoRecord> {
        let removed = self.videos.remove(&id);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    /// Flush dirty changes to disk using an atomic write (write then rename).
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog dir: {}", parent.display()))?;
        }

        let file = CatalogFile {
            next_id: self.next_id,
            videos: self.videos.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file).context("serializing catalog")?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &json)
            .with_context(|| format!("writing catalog temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming catalog: {}", self.path.display()))?;

        self.dirty = false;
        Ok(())
    }
}

impl Drop for Catalog {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                tracing::warn!("failed to flush catalog on drop: {e}");
            }
        }
    }
}
