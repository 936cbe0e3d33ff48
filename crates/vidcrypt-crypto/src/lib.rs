//! vidcrypt-crypto: encrypted-at-rest video blobs with byte-range decoding
//!
//! Write path: one AES-256-CBC context chained across the whole file.
//!
//! ```text
//! plaintext → 64 KiB buffers → space-pad last buffer to 16 → CBC(key, iv) → blob
//! ```
//!
//! Read path: seek to the requested offset, read up to 1 MiB at a time and
//! decrypt each read with a fresh CBC context whose IV is derived from the
//! 64 KiB window the request starts in:
//!
//! ```text
//! chunk_index = start / 65536
//! chunk_iv    = base_iv XOR be128(chunk_index)
//! ```
//!
//! # Known limitation
//!
//! The two paths only agree for reads that start in window 0 and fit in a
//! single read. Every fresh decryptor feeds `chunk_iv` into its first block
//! where the chained encoder used the preceding ciphertext block, so the
//! first 16 bytes of any other read come out scrambled. Blocks after the
//! first in the same read are unaffected. Blobs carry no authentication tag.

pub mod codec;
pub mod decode;
pub mod encode;
pub mod error;
pub mod keys;

pub use codec::{chunk_index_for, decrypt_chunk, derive_chunk_iv, ChainedEncryptor};
pub use decode::{decode_range, RangeDecoder, DEFAULT_READ_SIZE};
pub use encode::{encode, encode_file, EncodeSummary};
pub use error::CodecError;
pub use keys::{EncodedKeyMaterial, KeyMaterial};

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// CBC IV size in bytes
pub const IV_SIZE: usize = 16;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Plaintext window size: encoder read buffer and IV-derivation unit
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Byte appended to the final buffer to reach block alignment
pub const PAD_BYTE: u8 = b' ';
