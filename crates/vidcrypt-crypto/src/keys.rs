//! Per-video key material: AES-256 key + CBC base IV

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::{CodecError, IV_SIZE, KEY_SIZE};

/// A 256-bit key and 128-bit IV generated once per video. Zeroized on drop.
#[derive(Clone)]
pub struct KeyMaterial {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

/// Text-safe form of [`KeyMaterial`] as stored in the video record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedKeyMaterial {
    pub key: String,
    pub iv: String,
}

impl KeyMaterial {
    /// Generate a fresh key and IV from the operating system CSPRNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    pub fn from_bytes(key: [u8; KEY_SIZE], iv: [u8; IV_SIZE]) -> Self {
        Self { key, iv }
    }

    /// Parse base64 key and IV strings, checking both lengths.
    pub fn decode(key_b64: &str, iv_b64: &str) -> Result<Self, CodecError> {
        let mut key_bytes = STANDARD
            .decode(key_b64)
            .map_err(|e| CodecError::InvalidKeyMaterial(format!("key is not base64: {e}")))?;
        let mut iv_bytes = STANDARD
            .decode(iv_b64)
            .map_err(|e| CodecError::InvalidKeyMaterial(format!("iv is not base64: {e}")))?;

        let result = if key_bytes.len() != KEY_SIZE {
            Err(CodecError::InvalidKeyMaterial(format!(
                "key has {} bytes (expected {KEY_SIZE})",
                key_bytes.len()
            )))
        } else if iv_bytes.len() != IV_SIZE {
            Err(CodecError::InvalidKeyMaterial(format!(
                "iv has {} bytes (expected {IV_SIZE})",
                iv_bytes.len()
            )))
        } else {
            let mut key = [0u8; KEY_SIZE];
            let mut iv = [0u8; IV_SIZE];
            key.copy_from_slice(&key_bytes);
            iv.copy_from_slice(&iv_bytes);
            Ok(Self { key, iv })
        };

        key_bytes.zeroize();
        iv_bytes.zeroize();
        result
    }

    /// Base64-encode key and IV for persistence.
    pub fn encode(&self) -> EncodedKeyMaterial {
        EncodedKeyMaterial {
            key: STANDARD.encode(self.key),
            iv: STANDARD.encode(self.iv),
        }
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}
