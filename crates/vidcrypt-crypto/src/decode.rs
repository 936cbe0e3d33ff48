//! Lazy byte-range decoder over an encrypted blob
//!
//! A [`RangeDecoder`] is a forward-only iterator. Each `next()` reads at most
//! `read_size` bytes of the remaining range and yields their decryption;
//! nothing else is buffered. A decrypt or read failure ends the sequence
//! early and is only visible through logs and [`RangeDecoder::is_truncated`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::iter::FusedIterator;
use std::path::Path;

use tracing::{debug, error, warn};

use crate::codec::{chunk_index_for, decrypt_chunk_in_place, read_full};
use crate::keys::KeyMaterial;
use crate::CodecError;

/// Default bytes per blob read: 1 MiB
pub const DEFAULT_READ_SIZE: usize = 1024 * 1024;

pub struct RangeDecoder<R> {
    reader: R,
    keys: KeyMaterial,
    /// Derived once from the range start and reused for every read
    chunk_index: u64,
    position: u64,
    remaining: u64,
    read_size: usize,
    finished: bool,
    truncated: bool,
}

impl<R: Read + Seek> RangeDecoder<R> {
    /// Position `reader` at `start` and prepare to decode `length` bytes.
    pub fn new(mut reader: R, keys: KeyMaterial, start: u64, length: u64) -> io::Result<Self> {
        reader.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader,
            keys,
            chunk_index: chunk_index_for(start),
            position: start,
            remaining: length,
            read_size: DEFAULT_READ_SIZE,
            finished: length == 0,
            truncated: false,
        })
    }
}

impl<R> RangeDecoder<R> {
    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }

    pub fn chunk_index(&self) -> u64 {
        self.chunk_index
    }

    /// Bytes of the requested range not yet produced.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// True if the sequence ended because of a decrypt or read failure.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn stop(&mut self, truncated: bool) {
        self.finished = true;
        self.truncated = truncated;
    }
}

impl<R: Read> Iterator for RangeDecoder<R> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.finished {
            return None;
        }

        let want = self.remaining.min(self.read_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let filled = match read_full(&mut self.reader, &mut buf) {
            Ok(n) => n,
            Err(e) => {
                error!(offset = self.position, error = %e, "error reading encrypted blob");
                self.stop(true);
                return None;
            }
        };

        if filled == 0 {
            debug!(
                offset = self.position,
                remaining = self.remaining,
                "blob ended before requested range"
            );
            self.stop(false);
            return None;
        }
        buf.truncate(filled);

        if let Err(e) = decrypt_chunk_in_place(&self.keys, self.chunk_index, &mut buf) {
            warn!(offset = self.position, error = %e, "error decrypting chunk");
            self.stop(true);
            return None;
        }

        self.position += filled as u64;
        self.remaining -= filled as u64;
        if self.remaining == 0 {
            self.finished = true;
        }
        Some(buf)
    }
}

impl<R: Read> FusedIterator for RangeDecoder<R> {}

/// Open the blob at `path` and decode `length` bytes starting at `start`.
///
/// A missing blob is reported as [`CodecError::BlobNotFound`] before any
/// bytes are produced.
pub fn decode_range(
    path: &Path,
    keys: KeyMaterial,
    start: u64,
    length: u64,
) -> Result<RangeDecoder<File>, CodecError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => CodecError::BlobNotFound(path.to_path_buf()),
        _ => CodecError::Io(e),
    })?;
    Ok(RangeDecoder::new(file, keys, start, length)?)
}
