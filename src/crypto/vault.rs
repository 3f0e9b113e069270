//! Credential vault for at-rest encryption of provider credentials.
//!
//! OAuth token pairs and IMAP/SMTP passwords are stored in the accounts
//! table as opaque blobs encrypted with AES-256-GCM under a process-wide
//! key. Each encryption call draws a fresh 96-bit nonce, and the output
//! packs `version || nonce || ciphertext || tag` so decryption is
//! self-describing and the framing can survive a future key rotation.

use base64::prelude::*;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Environment variable holding the base64-encoded 32-byte vault key.
pub const VAULT_KEY_ENV: &str = "OUTPOST_VAULT_KEY";

/// Framing version for encrypted blobs.
const FRAME_VERSION: u8 = 1;

/// Errors that can occur during vault operations.
///
/// All of these are fatal for the calling operation; a key that is missing
/// or malformed is an operational misconfiguration and is surfaced at
/// startup rather than swallowed.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("vault key is not configured (set {VAULT_KEY_ENV})")]
    MissingKey,

    #[error("vault key is malformed: {0}")]
    InvalidKey(String),

    #[error("encrypted blob is malformed: {0}")]
    MalformedBlob(String),

    #[error("decryption failed: authentication tag mismatch (tampered data or wrong key)")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("credential payload error: {0}")]
    Payload(String),
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Encrypts and decrypts credential blobs with a process-wide AEAD key.
///
/// The vault performs no I/O; callers read and write the opaque blobs it
/// produces.
pub struct CredentialVault {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CredentialVault {
    /// Creates a vault from a raw 32-byte key.
    pub fn new(key_bytes: &[u8]) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, key_bytes)
            .map_err(|_| CryptoError::InvalidKey(format!("expected 32 bytes, got {}", key_bytes.len())))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Creates a vault from a base64-encoded key.
    pub fn from_base64(key_b64: &str) -> Result<Self> {
        let key_bytes = BASE64_STANDARD
            .decode(key_b64.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("invalid base64: {}", e)))?;
        Self::new(&key_bytes)
    }

    /// Creates a vault from the `OUTPOST_VAULT_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let key_b64 = std::env::var(VAULT_KEY_ENV).map_err(|_| CryptoError::MissingKey)?;
        Self::from_base64(&key_b64)
    }

    /// Encrypts a plaintext payload into a self-describing blob.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut blob = Vec::with_capacity(1 + NONCE_LEN + in_out.len());
        blob.push(FRAME_VERSION);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out);
        Ok(blob)
    }

    /// Decrypts a blob previously produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        let min_len = 1 + NONCE_LEN + AES_256_GCM.tag_len();
        if blob.len() < min_len {
            return Err(CryptoError::MalformedBlob(format!(
                "blob too short: {} bytes",
                blob.len()
            )));
        }

        let version = blob[0];
        if version != FRAME_VERSION {
            return Err(CryptoError::MalformedBlob(format!(
                "unsupported frame version {}",
                version
            )));
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(&blob[1..1 + NONCE_LEN]);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = blob[1 + NONCE_LEN..].to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| CryptoError::AuthenticationFailed)?;

        Ok(plaintext.to_vec())
    }

    /// Serializes a value to JSON and encrypts it.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value).map_err(|e| CryptoError::Payload(e.to_string()))?;
        self.encrypt(&json)
    }

    /// Decrypts a blob and deserializes the JSON payload.
    pub fn decrypt_json<T: DeserializeOwned>(&self, blob: &[u8]) -> Result<T> {
        let json = self.decrypt(blob)?;
        serde_json::from_slice(&json).map_err(|e| CryptoError::Payload(e.to_string()))
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}
