use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("chunk {chunk_index} decryption failed: {len} bytes is not a whole number of blocks")]
    Decrypt { chunk_index: u64, len: usize },

    #[error("cannot encrypt {0} bytes: not a whole number of blocks")]
    Unaligned(usize),

    #[error("encrypted blob not found: {}", .0.display())]
    BlobNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
