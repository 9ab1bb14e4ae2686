//! `Authorization` header session loader.

use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::request::Parts;

use crate::error::SessionError;
use crate::sessions::{Encoder, Session, SessionLoader};

/// Authorization scheme for proxy-issued session tokens
pub const AUTHORIZATION_TYPE_POMERIUM: &str = "Pomerium";

/// Reads `Authorization: <scheme> <token>`.
pub struct HeaderStore {
    encoder: Arc<dyn Encoder>,
    auth_type: String,
}

impl HeaderStore {
    /// Creates a loader matching `auth_type` case-insensitively.
    pub fn new(encoder: Arc<dyn Encoder>, auth_type: impl Into<String>) -> Self {
        Self {
            encoder,
            auth_type: auth_type.into(),
        }
    }

    /// Extracts the token when the header uses this store's scheme.
    fn token_from<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (scheme, token) = value.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case(&self.auth_type) {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }
}

impl SessionLoader for HeaderStore {
    fn load(&self, request: &Parts) -> Result<Session, SessionError> {
        let token = request
            .headers
            .get_all(AUTHORIZATION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(|v| self.token_from(v))
            .ok_or(SessionError::NotFound)?;

        self.encoder.unmarshal(token)
    }
}
