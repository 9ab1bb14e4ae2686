//! Key derivation for proxy ↔ authenticate trust
//!
//! Both primitives are derived from the same shared secret: an AEAD cipher
//! for inter-service payloads and an HS256 signer for session tokens.

pub mod cipher;
pub mod signer;

pub use cipher::SharedCipher;
pub use signer::JwsEncoder;

use thiserror::Error;

/// Errors raised by the shared cipher at runtime
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Encryption operation failed
    #[error("Encryption failed: {reason}")]
    EncryptionFailed {
        /// Reason for failure
        reason: String,
    },

    /// Decryption operation failed
    #[error("Decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for failure
        reason: String,
    },
}

impl CryptoError {
    /// Creates an EncryptionFailed error
    #[must_use]
    pub fn encryption_failed(reason: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            reason: reason.into(),
        }
    }

    /// Creates a DecryptionFailed error
    #[must_use]
    pub fn decryption_failed(reason: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            reason: reason.into(),
        }
    }
}
