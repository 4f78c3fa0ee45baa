//! Key derivation and authenticated sealing for QR payloads.
//!
//! This module provides:
//! - Argon2id-based derivation of the codec key from a passphrase
//! - AES-256-GCM sealing of the serialized payload
//!
//! # Security
//!
//! - Argon2id is memory-hard (resistant to GPU/ASIC attacks)
//! - AES-256-GCM authenticates the payload, so tampered QR codes fail to open
//! - A random nonce is drawn for every seal

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::Zeroizing;

use super::crypto::{CodecKey, CryptoError, CODEC_KEY_LEN};

/// Length of the AES-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Minimum salt length accepted by Argon2.
pub const MIN_SALT_LEN: usize = 8;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 47104,
            iterations: 1,
            parallelism: 1,
        }
    }
}

/// A sealed payload: nonce followed by AEAD ciphertext.
#[derive(Debug, Clone)]
pub struct SealedBox {
    /// Nonce used for AES-256-GCM
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext including the authentication tag
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Serialize to bytes (`nonce || ciphertext`).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        result.extend_from_slice(&self.nonce);
        result.extend_from_slice(&self.ciphertext);
        result
    }

    /// Deserialize from bytes.
    ///
    /// # Errors
    /// Returns error if the input is shorter than a nonce plus a GCM tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        // 16-byte GCM tag is always present, even for empty plaintext
        if bytes.len() < NONCE_LEN + 16 {
            return Err(CryptoError::InvalidFormat);
        }

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);

        Ok(Self {
            nonce,
            ciphertext: bytes[NONCE_LEN..].to_vec(),
        })
    }
}

/// Derive the codec key from a passphrase using Argon2id.
///
/// # Errors
/// Returns error if the salt is too short or the parameters are rejected.
pub fn derive_codec_key(
    passphrase: &str,
    salt: &[u8],
    params: KdfParams,
) -> Result<CodecKey, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt must be at least {MIN_SALT_LEN} bytes"
        )));
    }

    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(CODEC_KEY_LEN),
    )
    .map_err(|e| CryptoError::KeyDerivation(format!("Invalid Argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = Zeroizing::new([0u8; CODEC_KEY_LEN]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(CodecKey::from_bytes(&key))
}

/// Seal plaintext with AES-256-GCM under the codec key.
///
/// # Errors
/// Returns error if encryption fails.
pub fn seal(plaintext: &[u8], key: &CodecKey) -> Result<SealedBox, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(SealedBox {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Open a sealed box and verify its authentication tag.
///
/// # Errors
/// Returns `CryptoError::Decryption` if the key is wrong or data is tampered.
pub fn open(sealed: &SealedBox, key: &CodecKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;

    let nonce = Nonce::from_slice(&sealed.nonce);

    cipher
        .decrypt(nonce, sealed.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption)
}
