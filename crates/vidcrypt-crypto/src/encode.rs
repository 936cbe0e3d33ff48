//! Single-pass plaintext → encrypted blob encoder

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::{pad_in_place, read_full, ChainedEncryptor};
use crate::keys::KeyMaterial;
use crate::{CodecError, CHUNK_SIZE};

/// Sizes recorded for a finished encode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Bytes read from the plaintext source
    pub plaintext_len: u64,
    /// Bytes written to the blob (plaintext_len rounded up to 16)
    pub blob_len: u64,
}

/// Encrypt everything `reader` yields into `writer`.
///
/// Plaintext is read in [`CHUNK_SIZE`] buffers, each filled completely unless
/// EOF is hit, so padding can only ever land on the final buffer.
pub fn encode<R: Read, W: Write>(
    mut reader: R,
    mut writer: W,
    keys: &KeyMaterial,
) -> Result<EncodeSummary, CodecError> {
    let mut encryptor = ChainedEncryptor::new(keys)?;
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut summary = EncodeSummary {
        plaintext_len: 0,
        blob_len: 0,
    };

    loop {
        let filled = read_full(&mut reader, &mut buffer)?;
        if filled == 0 {
            break;
        }

        let padded = pad_in_place(&mut buffer, filled);
        encryptor.encrypt_in_place(&mut buffer[..padded])?;
        writer.write_all(&buffer[..padded])?;

        summary.plaintext_len += filled as u64;
        summary.blob_len += padded as u64;

        if filled < CHUNK_SIZE {
            break;
        }
    }

    writer.flush()?;
    Ok(summary)
}

/// Encrypt the file at `input` into a new blob at `output`.
///
/// The blob is written next to `output` under a `.partial` suffix and renamed
/// into place only after a successful flush + fsync. On failure the partial
/// file is removed and `output` is never created.
pub fn encode_file(
    input: &Path,
    output: &Path,
    keys: &KeyMaterial,
) -> Result<EncodeSummary, CodecError> {
    let source = File::open(input)?;
    let tmp_path = partial_path(output);

    let result = write_blob(source, &tmp_path, keys);
    match result {
        Ok(summary) => {
            fs::rename(&tmp_path, output).inspect_err(|_| {
                let _ = fs::remove_file(&tmp_path);
            })?;
            debug!(
                output = %output.display(),
                plaintext_len = summary.plaintext_len,
                blob_len = summary.blob_len,
                "blob encoded"
            );
            Ok(summary)
        }
        Err(e) => {
            warn!(output = %output.display(), error = %e, "encode failed, discarding partial blob");
            let _ = fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn write_blob(source: File, tmp_path: &Path, keys: &KeyMaterial) -> Result<EncodeSummary, CodecError> {
    let mut writer = BufWriter::new(File::create(tmp_path)?);
    let summary = encode(source, &mut writer, keys)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(summary)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
