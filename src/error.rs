//! Error handling module with type-safe, non-exhaustive error types
//!
//! Two families of errors live here:
//! - [`ProxyStateError`]: construction-time failures that abort a state
//!   build. The previously published state keeps serving.
//! - [`SessionError`]: per-request failures raised while loading or saving
//!   a session. They never escape the request that produced them.

use thiserror::Error;
use tonic::{Code, Status};

/// Patterns that must never reach a log line verbatim
const SENSITIVE_PATTERNS: &[&str] = &[
    "secret",
    "password",
    "token",
    "key",
    "credential",
    "private",
    "bearer",
    "authorization",
];

/// Errors raised while building a [`crate::ProxyState`].
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyStateError {
    /// The configuration violates a constraint
    #[error("invalid configuration: {reason}")]
    Validation {
        /// First violated constraint
        reason: String,
    },

    /// Key material or a secret is malformed
    #[error("bad key material: {reason}")]
    Configuration {
        /// Description of the malformation (sanitized)
        reason: String,
    },

    /// The authorize channel could not be prepared
    #[error("authorize connection failed: {reason}")]
    Connection {
        /// Description of the failure (sanitized)
        reason: String,
    },
}

impl ProxyStateError {
    /// Creates a Validation error
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Creates a Configuration error
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: sanitize_error_message(&reason.into()),
        }
    }

    /// Creates a Connection error
    #[must_use]
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: sanitize_error_message(&reason.into()),
        }
    }

    /// Short label used for metrics and structured logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Configuration { .. } => "configuration",
            Self::Connection { .. } => "connection",
        }
    }
}

/// Per-request session errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No credential present in the inspected request part
    #[error("session not found")]
    NotFound,

    /// The session could not be serialized or signed
    #[error("session encoding failed: {reason}")]
    Encoding {
        /// Description of the failure
        reason: String,
    },

    /// A credential was present but failed verification or parsing
    #[error("session decoding failed: {reason}")]
    Decoding {
        /// Description of the failure
        reason: String,
    },
}

/// Error codes for logs and responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No session was supplied
    SessionMissing,
    /// A session was supplied but is invalid
    SessionInvalid,
    /// A session could not be written
    SessionEncoding,
}

impl ErrorCode {
    /// Get the string representation of the error code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionMissing => "AUTH_SESSION_MISSING",
            Self::SessionInvalid => "AUTH_SESSION_INVALID",
            Self::SessionEncoding => "AUTH_SESSION_ENCODING",
        }
    }
}

impl SessionError {
    /// Creates an Encoding error
    #[must_use]
    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding {
            reason: reason.into(),
        }
    }

    /// Creates a Decoding error
    #[must_use]
    pub fn decoding(reason: impl Into<String>) -> Self {
        Self::Decoding {
            reason: reason.into(),
        }
    }

    /// True when the credential was simply absent
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Get the error code for this error
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound => ErrorCode::SessionMissing,
            Self::Decoding { .. } => ErrorCode::SessionInvalid,
            Self::Encoding { .. } => ErrorCode::SessionEncoding,
        }
    }

    /// Convert to a gRPC status.
    ///
    /// Every load failure renders identically so callers cannot learn which
    /// source was inspected or why it was rejected.
    #[must_use]
    pub fn to_status(&self) -> Status {
        match self {
            Self::NotFound | Self::Decoding { .. } => {
                Status::new(Code::Unauthenticated, "not authenticated")
            }
            Self::Encoding { .. } => Status::new(Code::Internal, "Internal error"),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for SessionError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        let reason = match err.kind() {
            ErrorKind::ExpiredSignature => "expired",
            ErrorKind::ImmatureSignature => "not yet valid",
            ErrorKind::InvalidSignature => "signature mismatch",
            ErrorKind::InvalidAudience => "audience mismatch",
            ErrorKind::InvalidIssuer => "issuer mismatch",
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => "bad algorithm",
            ErrorKind::MissingRequiredClaim(_) => "missing claim",
            _ => "malformed",
        };
        Self::decoding(reason)
    }
}

/// Sanitizes error messages to remove potential key material
fn sanitize_error_message(message: &str) -> String {
    let lower = message.to_lowercase();

    if looks_like_key_material(message) {
        return "Operation failed (details redacted)".to_string();
    }

    for pattern in SENSITIVE_PATTERNS {
        if lower.contains(pattern) && lower.contains('=') {
            return "Operation failed (details redacted)".to_string();
        }
    }

    message.to_string()
}

/// Checks if a string contains a long base64 run
fn looks_like_key_material(s: &str) -> bool {
    s.split_whitespace().any(|word| {
        word.len() >= 32
            && word
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_'))
    })
}

/// Check if a string contains sensitive information
#[must_use]
pub fn contains_sensitive_info(text: &str) -> bool {
    let lower = text.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_removes_base64_secret() {
        let err = ProxyStateError::configuration(
            "could not decode hEx0jRsJk6C5fXzUNz2eC6FuE9VTfE5C1MCdJ6kCgoc=",
        );
        assert_eq!(
            err,
            ProxyStateError::Configuration {
                reason: "Operation failed (details redacted)".to_string()
            }
        );
    }

    #[test]
    fn test_sanitize_removes_key_value() {
        let err = ProxyStateError::connection("Error: key=abc123secret");
        assert!(!err.to_string().contains("abc123secret"));
    }

    #[test]
    fn test_sanitize_preserves_normal_message() {
        let err = ProxyStateError::connection("Connection refused");
        assert_eq!(err.to_string(), "authorize connection failed: Connection refused");
    }

    #[test]
    fn test_load_failures_are_indistinguishable() {
        let missing = SessionError::NotFound.to_status();
        let invalid = SessionError::decoding("signature mismatch").to_status();

        assert_eq!(missing.code(), Code::Unauthenticated);
        assert_eq!(missing.code(), invalid.code());
        assert_eq!(missing.message(), invalid.message());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(SessionError::NotFound.code().as_str(), "AUTH_SESSION_MISSING");
        assert_eq!(
            SessionError::decoding("x").code().as_str(),
            "AUTH_SESSION_INVALID"
        );
        assert!(SessionError::NotFound.is_not_found());
        assert!(!SessionError::encoding("x").is_not_found());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(ProxyStateError::validation("x").kind(), "validation");
        assert_eq!(ProxyStateError::configuration("x").kind(), "configuration");
        assert_eq!(ProxyStateError::connection("x").kind(), "connection");
    }

    #[test]
    fn test_contains_sensitive_info() {
        assert!(contains_sensitive_info("Bearer abc"));
        assert!(!contains_sensitive_info("connection refused"));
    }
}
