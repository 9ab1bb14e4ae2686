//! Session tokens and the strategies that locate them in a request.
//!
//! A [`SessionLoader`] inspects one part of a request (cookie, header, query
//! string). A [`SessionStore`] can also write the session back to a response.
//! The [`LoaderChain`] tries loaders in a fixed precedence order.

pub mod chain;
pub mod cookie;
pub mod header;
pub mod query;

pub use chain::LoaderChain;
pub use cookie::{CookieOptions, CookieStore};
pub use header::HeaderStore;
pub use query::QueryParamStore;

use std::collections::HashMap;
use std::time::Duration;

use http::request::Parts;
use http::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::SessionError;

/// Session claims carried by the signed token.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Session {
    /// Issuer
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iss: String,
    /// Subject (user id)
    #[serde(default)]
    pub sub: String,
    /// Audiences
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub aud: Vec<String>,
    /// Expiry, seconds since the epoch
    pub exp: i64,
    /// Issued-at, seconds since the epoch
    #[serde(default)]
    pub iat: i64,
    /// Not-before, seconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// User email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Group memberships
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    /// Issued for API access rather than a browser
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub programmatic: bool,
    /// Any other claims
    #[serde(flatten)]
    pub custom: HashMap<String, Value>,
}

impl Session {
    /// Creates a session for `sub` issued now and valid for `lifetime`.
    #[must_use]
    pub fn new(sub: impl Into<String>, lifetime: Duration) -> Self {
        let now = chrono::Utc::now().timestamp();
        let lifetime = i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX);
        Self {
            sub: sub.into(),
            iat: now,
            exp: now.saturating_add(lifetime),
            ..Self::default()
        }
    }

    /// True once `exp` is in the past
    pub fn is_expired(&self) -> bool {
        self.exp < chrono::Utc::now().timestamp()
    }

    /// Looks up a claim by its JSON name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<Value> {
        match name {
            "iss" => (!self.iss.is_empty()).then(|| Value::from(self.iss.clone())),
            "sub" => (!self.sub.is_empty()).then(|| Value::from(self.sub.clone())),
            "aud" => (!self.aud.is_empty()).then(|| Value::from(self.aud.clone())),
            "exp" => Some(Value::from(self.exp)),
            "iat" => Some(Value::from(self.iat)),
            "nbf" => self.nbf.map(Value::from),
            "email" => self.email.clone().map(Value::from),
            "groups" => self.groups.clone().map(Value::from),
            "programmatic" => Some(Value::from(self.programmatic)),
            _ => self.custom.get(name).cloned(),
        }
    }
}

/// Accepts `"aud": "x"` as well as `"aud": ["x", "y"]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// Serializes sessions into compact signed tokens and back.
pub trait Encoder: Send + Sync {
    /// Signs a session.
    fn marshal(&self, session: &Session) -> Result<String, SessionError>;

    /// Verifies and parses a signed session.
    fn unmarshal(&self, raw: &str) -> Result<Session, SessionError>;
}

/// Reads a session from one part of a request.
pub trait SessionLoader: Send + Sync {
    /// Returns `SessionError::NotFound` when this loader's source is absent
    /// and `SessionError::Decoding` when it is present but invalid.
    fn load(&self, request: &Parts) -> Result<Session, SessionError>;
}

/// A loader that can also persist sessions onto a response.
pub trait SessionStore: SessionLoader {
    /// Writes the session into `headers`.
    fn save(&self, headers: &mut HeaderMap, session: &Session) -> Result<(), SessionError>;

    /// Removes any stored session.
    fn clear(&self, headers: &mut HeaderMap);
}
