//! Query-string session loader.

use std::sync::Arc;

use http::request::Parts;

use crate::error::SessionError;
use crate::sessions::{Encoder, Session, SessionLoader};

/// Query parameter carrying a session token
pub const SESSION_QUERY_PARAM: &str = "pomerium_session";

/// Reads a session from a named query parameter.
pub struct QueryParamStore {
    encoder: Arc<dyn Encoder>,
    param: String,
}

impl QueryParamStore {
    /// Creates a loader for the query parameter `param`.
    pub fn new(encoder: Arc<dyn Encoder>, param: impl Into<String>) -> Self {
        Self {
            encoder,
            param: param.into(),
        }
    }
}

impl SessionLoader for QueryParamStore {
    fn load(&self, request: &Parts) -> Result<Session, SessionError> {
        let query = request.uri.query().ok_or(SessionError::NotFound)?;

        let token = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == self.param.as_str())
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
            .ok_or(SessionError::NotFound)?;

        self.encoder.unmarshal(&token)
    }
}
