//! AES-256-CBC transforms shared by the encoder and the range decoder
//!
//! - [`ChainedEncryptor`]: a single CBC context carried across every buffer
//!   of a file (write path).
//! - [`decrypt_chunk`]: a fresh CBC context per call, seeded with an IV
//!   derived from the chunk index (read path). No padding is removed.

use std::io::{self, Read};

use aes::Aes256;
use cbc::cipher::{
    block_padding::NoPadding, generic_array::GenericArray, BlockDecryptMut, BlockEncryptMut,
    KeyIvInit,
};

use crate::keys::KeyMaterial;
use crate::{CodecError, BLOCK_SIZE, CHUNK_SIZE, IV_SIZE, PAD_BYTE};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Which 64 KiB plaintext window `offset` falls in.
pub fn chunk_index_for(offset: u64) -> u64 {
    offset / CHUNK_SIZE as u64
}

/// XOR the base IV with the big-endian 128-bit encoding of `chunk_index`.
pub fn derive_chunk_iv(base_iv: &[u8; IV_SIZE], chunk_index: u64) -> [u8; IV_SIZE] {
    let index = u128::from(chunk_index).to_be_bytes();
    let mut iv = *base_iv;
    for (byte, mask) in iv.iter_mut().zip(index) {
        *byte ^= mask;
    }
    iv
}

/// Smallest multiple of [`BLOCK_SIZE`] that holds `len` bytes.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Decrypt one chunk read with a fresh CBC context.
///
/// - `keys`: the video's key and base IV
/// - `chunk_index`: selects the derived IV (see [`derive_chunk_iv`])
/// - `ciphertext`: must be a whole number of blocks
pub fn decrypt_chunk(
    keys: &KeyMaterial,
    chunk_index: u64,
    ciphertext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let mut buf = ciphertext.to_vec();
    decrypt_chunk_in_place(keys, chunk_index, &mut buf)?;
    Ok(buf)
}

/// In-place variant of [`decrypt_chunk`]. On error `buf` is left untouched.
pub fn decrypt_chunk_in_place(
    keys: &KeyMaterial,
    chunk_index: u64,
    buf: &mut [u8],
) -> Result<(), CodecError> {
    let iv = derive_chunk_iv(keys.iv(), chunk_index);
    let cipher = Aes256CbcDec::new_from_slices(keys.key(), &iv)
        .map_err(|e| CodecError::InvalidKeyMaterial(e.to_string()))?;

    let len = buf.len();
    cipher
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| CodecError::Decrypt { chunk_index, len })?;
    Ok(())
}

/// CBC encryptor chained across all buffers of one file.
pub struct ChainedEncryptor {
    inner: Aes256CbcEnc,
}

impl ChainedEncryptor {
    pub fn new(keys: &KeyMaterial) -> Result<Self, CodecError> {
        let inner = Aes256CbcEnc::new_from_slices(keys.key(), keys.iv())
            .map_err(|e| CodecError::InvalidKeyMaterial(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Encrypt `buf` in place, continuing the chain from the previous call.
    pub fn encrypt_in_place(&mut self, buf: &mut [u8]) -> Result<(), CodecError> {
        if buf.len() % BLOCK_SIZE != 0 {
            return Err(CodecError::Unaligned(buf.len()));
        }
        for block in buf.chunks_exact_mut(BLOCK_SIZE) {
            self.inner
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        Ok(())
    }
}

/// Right-pad `buf[..len]` with [`PAD_BYTE`] up to block alignment.
///
/// Returns the padded length. `buf` must have room for it.
pub(crate) fn pad_in_place(buf: &mut [u8], len: usize) -> usize {
    let padded = padded_len(len);
    buf[len..padded].fill(PAD_BYTE);
    padded
}

/// Fill `buf` from `reader`, stopping early only at EOF.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
