//! Sealed payload codec.
//!
//! A sealed payload is `base64(nonce || box)` where `box` is an
//! XSalsa20-Poly1305 secretbox (the NaCl/libsodium `crypto_secretbox`
//! construction, tag first). The upstream employee API produces these and the
//! viewer opens them with a shared 32 byte key.

use base64::{
    Engine as _,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::Value;
use thiserror::Error;
use zeroize::Zeroize;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Standard alphabet, padded on output, padding optional on input.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum SealError {
    #[error("invalid key length; expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid encrypted data format")]
    Truncated,
    #[error("decryption failed")]
    Decryption,
    #[error("encryption failed")]
    Encryption,
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl SealError {
    /// Fixed wording without decoder or length detail.
    pub fn summary(&self) -> &'static str {
        match self {
            SealError::InvalidKeyLength(_) => "invalid sealing key",
            SealError::Base64(_) => "failed to decode base64 response",
            SealError::Truncated => "invalid encrypted data format",
            SealError::Decryption => "decryption failed",
            SealError::Encryption => "encryption failed",
            SealError::Json(_) => "invalid JSON data after decryption",
        }
    }
}

pub type SealResult<T> = Result<T, SealError>;

/// Symmetric key shared between the sealing API and the viewer.
pub struct SealKey {
    key: Key,
}

impl SealKey {
    pub fn from_bytes(bytes: &[u8]) -> SealResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(SealError::InvalidKeyLength(bytes.len()));
        }
        let mut key = Key::default();
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Parses the base64 form stored in `SODIUM_KEY`.
    pub fn from_base64(encoded: &str) -> SealResult<Self> {
        let mut decoded = PAYLOAD_ENGINE.decode(encoded.trim().as_bytes())?;
        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let key = Self {
            key: *Key::from_slice(&bytes),
        };
        bytes.zeroize();
        key
    }

    pub fn to_base64(&self) -> String {
        PAYLOAD_ENGINE.encode(self.key.as_slice())
    }

    fn cipher(&self) -> XSalsa20Poly1305 {
        XSalsa20Poly1305::new(&self.key)
    }
}

impl std::fmt::Debug for SealKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealKey(<redacted>)")
    }
}

impl Drop for SealKey {
    fn drop(&mut self) {
        self.key.as_mut_slice().zeroize();
    }
}

/// Decodes and decrypts a sealed payload into its plaintext bytes.
pub fn open(encoded: &str, key: &SealKey) -> SealResult<Vec<u8>> {
    let combined = PAYLOAD_ENGINE.decode(encoded.trim().as_bytes())?;
    if combined.len() < NONCE_LEN {
        return Err(SealError::Truncated);
    }
    let (nonce, sealed) = combined.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| SealError::Decryption)
}

/// Encrypts `plaintext` under a fresh random nonce and encodes the result.
pub fn seal(plaintext: &[u8], key: &SealKey) -> SealResult<String> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let sealed = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| SealError::Encryption)?;

    let mut combined = Vec::with_capacity(NONCE_LEN + sealed.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&sealed);
    Ok(PAYLOAD_ENGINE.encode(combined))
}

pub fn open_json(encoded: &str, key: &SealKey) -> SealResult<Value> {
    let plaintext = open(encoded, key)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

pub fn seal_json(value: &Value, key: &SealKey) -> SealResult<String> {
    let plaintext = serde_json::to_vec(value)?;
    seal(&plaintext, key)
}
