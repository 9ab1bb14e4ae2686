//! Shared AES-256-GCM cipher
//!
//! Sealed payloads are laid out as `nonce || ciphertext || tag`.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;

use crate::crypto::CryptoError;
use crate::error::ProxyStateError;

/// Required key length in bytes
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes
pub const NONCE_LEN: usize = 12;

const TAG_LEN: usize = 16;

/// Authenticated-encryption instance derived from the shared secret.
#[derive(Clone)]
pub struct SharedCipher {
    cipher: Aes256Gcm,
}

impl SharedCipher {
    /// Derives a cipher from a standard base64 secret.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Configuration` if the secret is not valid
    /// base64 or does not decode to exactly 32 bytes.
    pub fn from_base64(secret: &str) -> Result<Self, ProxyStateError> {
        let key = STANDARD
            .decode(secret.trim())
            .map_err(|e| ProxyStateError::configuration(format!("shared secret is not valid base64: {e}")))?;
        Self::new(&key)
    }

    /// Builds a cipher from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Configuration` on a wrong key length.
    pub fn new(key: &[u8]) -> Result<Self, ProxyStateError> {
        if key.len() != KEY_LEN {
            return Err(ProxyStateError::configuration(format!(
                "shared secret must decode to {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| ProxyStateError::configuration("invalid AES-256-GCM key"))?;

        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if the AEAD rejects the input.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, Payload { msg: plaintext, aad })
            .map_err(|e| CryptoError::encryption_failed(format!("AES-GCM encrypt failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Opens a payload produced by [`SharedCipher::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on short, tampered, or
    /// foreign-key input.
    pub fn decrypt(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::decryption_failed("ciphertext too short"));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::decryption_failed("authentication failed"))
    }
}

impl fmt::Debug for SharedCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCipher").finish_non_exhaustive()
    }
}
