//! Key material for sealing QR payloads.
//!
//! # Memory Security
//!
//! `CodecKey` implements `Zeroize` and `ZeroizeOnDrop` so the AES key is
//! erased when the codec is dropped. Its `Debug` output only carries a
//! SHA-256 fingerprint.

use base64::engine::general_purpose;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of the AES-256 key in bytes.
pub const CODEC_KEY_LEN: usize = 32;

/// Error type for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: authentication tag mismatch")]
    Decryption,

    #[error("Invalid sealed payload format")]
    InvalidFormat,

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
}

/// Symmetric application key used to seal QR payloads.
///
/// Sourced from configuration (raw key file or Argon2id-derived passphrase),
/// never from a literal in the binary.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CodecKey {
    inner: [u8; CODEC_KEY_LEN],

    /// Key fingerprint for identification (NOT secret)
    #[zeroize(skip)]
    pub fingerprint: String,
}

impl CodecKey {
    /// Copy raw key bytes into a new key. The caller keeps ownership of
    /// (and should wipe) the source buffer.
    #[must_use]
    pub fn from_bytes(bytes: &[u8; CODEC_KEY_LEN]) -> Self {
        Self {
            inner: *bytes,
            fingerprint: compute_fingerprint(bytes),
        }
    }

    /// Parse a base64 encoded 32-byte key.
    ///
    /// # Errors
    /// Returns `CryptoError::InvalidKeyFormat` if the text is not base64 or
    /// does not decode to exactly 32 bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;

        if decoded.len() != CODEC_KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(CryptoError::InvalidKeyFormat(format!(
                "expected {CODEC_KEY_LEN} bytes, got {len}"
            )));
        }

        let mut bytes = Zeroizing::new([0u8; CODEC_KEY_LEN]);
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self::from_bytes(&bytes))
    }

    /// Generate a fresh random key from OS entropy.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; CODEC_KEY_LEN]);
        OsRng.fill_bytes(&mut bytes[..]);
        Self::from_bytes(&bytes)
    }

    /// Encode the key as base64 (for writing key files).
    #[must_use]
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.inner)
    }

    /// Get the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }
}

impl std::fmt::Debug for CodecKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecKey")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Compute a fingerprint for key identification using SHA-256.
fn compute_fingerprint(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();

    // First 8 bytes of the hash, never the key itself
    result[..8].iter().map(|b| format!("{b:02x}")).collect()
}
