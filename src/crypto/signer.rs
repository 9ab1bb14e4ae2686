//! HS256 session signer bound to the authenticate service host
//!
//! Tokens minted here carry the authenticate host as issuer and audience.
//! Parsing rejects tokens whose signature, audience or expiry fail to verify.

use std::fmt;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::error::{ProxyStateError, SessionError};
use crate::sessions::{Encoder, Session};

/// Signer/verifier for compact session tokens.
#[derive(Clone)]
pub struct JwsEncoder {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    audience: String,
    accepted: Vec<String>,
    validation: Validation,
}

impl JwsEncoder {
    /// Creates an HS256 encoder for `audience`.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Configuration` if the key or audience is empty.
    pub fn new(key: &[u8], audience: impl Into<String>) -> Result<Self, ProxyStateError> {
        let audience = audience.into();
        if key.is_empty() {
            return Err(ProxyStateError::configuration("signing key cannot be empty"));
        }
        if audience.is_empty() {
            return Err(ProxyStateError::configuration("signing audience cannot be empty"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            accepted: vec![audience.clone()],
            audience,
            validation,
        })
    }

    /// Also accepts tokens addressed to `audience`. Minted tokens keep the
    /// primary audience.
    #[must_use]
    pub fn with_accepted_audience(mut self, audience: impl Into<String>) -> Self {
        let audience = audience.into();
        if !audience.is_empty() && !self.accepted.contains(&audience) {
            self.accepted.push(audience);
            self.validation.set_audience(&self.accepted);
        }
        self
    }

    /// The audience/issuer this encoder is bound to
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }
}

impl Encoder for JwsEncoder {
    fn marshal(&self, session: &Session) -> Result<String, SessionError> {
        let mut claims = session.clone();
        if claims.iss.is_empty() {
            claims.iss.clone_from(&self.audience);
        }
        if claims.aud.is_empty() {
            claims.aud = vec![self.audience.clone()];
        }

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::encoding(e.to_string()))
    }

    fn unmarshal(&self, raw: &str) -> Result<Session, SessionError> {
        let data = decode::<Session>(raw, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }
}

impl fmt::Debug for JwsEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwsEncoder")
            .field("audience", &self.audience)
            .field("accepted", &self.accepted)
            .finish_non_exhaustive()
    }
}
