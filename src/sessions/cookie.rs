//! Cookie-backed session store
//!
//! Large sessions are split across numbered cookies: `name`, `name_1`,
//! `name_2`, ... Browsers cap a single cookie at roughly 4 KiB.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cookie::{Cookie, SameSite};
use http::header::{COOKIE, SET_COOKIE};
use http::request::Parts;
use http::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::error::{ProxyStateError, SessionError};
use crate::sessions::{Encoder, Session, SessionLoader, SessionStore};

/// Largest value written into a single cookie
pub const MAX_CHUNK_SIZE: usize = 3800;

/// Most cookies a single session may span
pub const MAX_NUM_CHUNKS: usize = 5;

/// Cookie policy, frozen per state generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    /// Base cookie name; chunks append `_<n>`
    pub name: String,
    /// Cookie domain, empty for host-only
    pub domain: String,
    /// `Secure` attribute
    pub secure: bool,
    /// `HttpOnly` attribute
    pub http_only: bool,
    /// Zero yields a browser-session cookie
    pub expire: Duration,
}

/// Stores the signed session in one or more cookies.
pub struct CookieStore {
    options: CookieOptions,
    encoder: Arc<dyn Encoder>,
}

impl CookieStore {
    /// Creates a store, evaluating `options` exactly once.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Configuration` if the cookie name is empty.
    pub fn new<F>(options: F, encoder: Arc<dyn Encoder>) -> Result<Self, ProxyStateError>
    where
        F: FnOnce() -> CookieOptions,
    {
        let options = options();
        if options.name.is_empty() {
            return Err(ProxyStateError::configuration("cookie name cannot be empty"));
        }
        Ok(Self { options, encoder })
    }

    /// The frozen cookie policy
    #[must_use]
    pub fn options(&self) -> &CookieOptions {
        &self.options
    }

    fn chunk_name(&self, index: usize) -> String {
        if index == 0 {
            self.options.name.clone()
        } else {
            format!("{}_{index}", self.options.name)
        }
    }

    fn make_cookie(&self, name: String, value: String, max_age: Option<Duration>) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .path("/")
            .secure(self.options.secure)
            .http_only(self.options.http_only)
            .same_site(SameSite::Lax);

        if !self.options.domain.is_empty() {
            builder = builder.domain(self.options.domain.clone());
        }
        if let Some(max_age) = max_age {
            let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
            builder = builder.max_age(cookie::time::Duration::seconds(secs));
        }
        builder.build()
    }

    fn expired_cookie(&self, index: usize) -> Cookie<'static> {
        self.make_cookie(self.chunk_name(index), String::new(), Some(Duration::ZERO))
    }

    fn append(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<(), SessionError> {
        let value = HeaderValue::from_str(&cookie.to_string())
            .map_err(|e| SessionError::encoding(format!("invalid set-cookie header: {e}")))?;
        headers.append(SET_COOKIE, value);
        Ok(())
    }
}

/// Collects request cookies by name; the first occurrence wins.
fn request_cookies(request: &Parts) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in request.headers.get_all(COOKIE) {
        let Ok(raw) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(raw).flatten() {
            cookies
                .entry(cookie.name().to_string())
                .or_insert_with(|| cookie.value().to_string());
        }
    }
    cookies
}

impl SessionLoader for CookieStore {
    fn load(&self, request: &Parts) -> Result<Session, SessionError> {
        let cookies = request_cookies(request);

        let mut raw = match cookies.get(&self.options.name) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => return Err(SessionError::NotFound),
        };
        for index in 1..MAX_NUM_CHUNKS {
            match cookies.get(&self.chunk_name(index)) {
                Some(chunk) if !chunk.is_empty() => raw.push_str(chunk),
                _ => break,
            }
        }

        self.encoder.unmarshal(&raw)
    }
}

impl SessionStore for CookieStore {
    fn save(&self, headers: &mut HeaderMap, session: &Session) -> Result<(), SessionError> {
        let raw = self.encoder.marshal(session)?;

        let chunks: Vec<&[u8]> = raw.as_bytes().chunks(MAX_CHUNK_SIZE).collect();
        if chunks.len() > MAX_NUM_CHUNKS {
            warn!(
                cookie = %self.options.name,
                size = raw.len(),
                max_chunks = MAX_NUM_CHUNKS,
                "Session too large for cookie policy, not saving"
            );
            return Ok(());
        }

        let used = chunks.len();
        let max_age = (!self.options.expire.is_zero()).then_some(self.options.expire);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let value = String::from_utf8_lossy(chunk).into_owned();
            let cookie = self.make_cookie(self.chunk_name(index), value, max_age);
            Self::append(headers, &cookie)?;
        }
        // Chunks left over from a larger previous session would otherwise be
        // appended on the next load.
        for index in used..MAX_NUM_CHUNKS {
            Self::append(headers, &self.expired_cookie(index))?;
        }

        debug!(cookie = %self.options.name, size = raw.len(), chunks = used, "Session cookie written");
        Ok(())
    }

    fn clear(&self, headers: &mut HeaderMap) {
        for index in 0..MAX_NUM_CHUNKS {
            if let Err(e) = Self::append(headers, &self.expired_cookie(index)) {
                warn!(error = %e, "Failed to clear session cookie");
            }
        }
    }
}

impl fmt::Debug for CookieStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::JwsEncoder;

    fn encoder() -> Arc<dyn Encoder> {
        Arc::new(JwsEncoder::new(b"0123456789abcdef0123456789abcdef", "auth.example.com").unwrap())
    }

    fn options() -> CookieOptions {
        CookieOptions {
            name: "_pomerium".to_string(),
            domain: "example.com".to_string(),
            secure: true,
            http_only: true,
            expire: Duration::from_secs(3600),
        }
    }

    fn store() -> CookieStore {
        CookieStore::new(options, encoder()).unwrap()
    }

    /// Encoder whose signing always fails.
    struct BrokenEncoder;

    impl Encoder for BrokenEncoder {
        fn marshal(&self, _session: &Session) -> Result<String, SessionError> {
            Err(SessionError::encoding("signing unavailable"))
        }

        fn unmarshal(&self, _raw: &str) -> Result<Session, SessionError> {
            Err(SessionError::decoding("malformed"))
        }
    }

    fn large_session(sub: &str) -> Session {
        let mut session = Session::new(sub, Duration::from_secs(60));
        session
            .custom
            .insert("blob".to_string(), serde_json::Value::from("x".repeat(5000)));
        session
    }

    /// Applies `Set-Cookie` headers to a browser-like jar: expired cookies
    /// are dropped, everything else overwrites by name.
    fn apply_to_jar(jar: &mut HashMap<String, String>, set_cookies: &HeaderMap) {
        for value in set_cookies.get_all(SET_COOKIE) {
            let cookie = Cookie::parse(value.to_str().unwrap().to_string()).unwrap();
            if cookie.max_age() == Some(cookie::time::Duration::ZERO) {
                jar.remove(cookie.name());
            } else {
                jar.insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
    }

    fn request_from_jar(jar: &HashMap<String, String>) -> Parts {
        let pairs: Vec<String> = jar.iter().map(|(k, v)| format!("{k}={v}")).collect();
        http::Request::builder()
            .header(COOKIE, pairs.join("; "))
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn test_empty_name_rejected() {
        let result = CookieStore::new(
            || CookieOptions {
                name: String::new(),
                ..options()
            },
            encoder(),
        );
        assert!(matches!(result, Err(ProxyStateError::Configuration { .. })));
    }

    #[test]
    fn test_save_sets_policy_attributes() {
        let mut headers = HeaderMap::new();
        store()
            .save(&mut headers, &Session::new("user-1", Duration::from_secs(60)))
            .unwrap();

        let header = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        let cookie = Cookie::parse(header.to_string()).unwrap();
        assert_eq!(cookie.name(), "_pomerium");
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::seconds(3600)));
    }

    #[test]
    fn test_saved_session_loads_back() {
        let store = store();
        let mut headers = HeaderMap::new();
        store
            .save(&mut headers, &Session::new("user-1", Duration::from_secs(60)))
            .unwrap();

        let mut jar = HashMap::new();
        apply_to_jar(&mut jar, &headers);
        let session = store.load(&request_from_jar(&jar)).unwrap();
        assert_eq!(session.sub, "user-1");
    }

    #[test]
    fn test_missing_cookie_is_not_found() {
        let request = http::Request::builder()
            .header(COOKIE, "other=value")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert_eq!(store().load(&request), Err(SessionError::NotFound));
    }

    #[test]
    fn test_tampered_cookie_is_decoding_error() {
        let request = http::Request::builder()
            .header(COOKIE, "_pomerium=eyJhbGciOiJIUzI1NiJ9.e30.AAAA")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert!(matches!(
            store().load(&request),
            Err(SessionError::Decoding { .. })
        ));
    }

    #[test]
    fn test_large_session_is_chunked() {
        let store = store();
        let session = large_session("user-1");

        let mut headers = HeaderMap::new();
        store.save(&mut headers, &session).unwrap();

        let mut jar = HashMap::new();
        apply_to_jar(&mut jar, &headers);
        let mut names: Vec<&str> = jar.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["_pomerium", "_pomerium_1"]);

        let loaded = store.load(&request_from_jar(&jar)).unwrap();
        assert_eq!(loaded, store.encoder.unmarshal(&store.encoder.marshal(&session).unwrap()).unwrap());
    }

    #[test]
    fn test_smaller_session_replaces_chunked_one() {
        let store = store();
        let mut jar = HashMap::new();

        let mut first = HeaderMap::new();
        store.save(&mut first, &large_session("big")).unwrap();
        apply_to_jar(&mut jar, &first);
        assert!(jar.contains_key("_pomerium_1"));

        let mut second = HeaderMap::new();
        store
            .save(&mut second, &Session::new("small", Duration::from_secs(60)))
            .unwrap();
        apply_to_jar(&mut jar, &second);

        assert!(!jar.contains_key("_pomerium_1"));
        assert_eq!(store.load(&request_from_jar(&jar)).unwrap().sub, "small");
    }

    #[test]
    fn test_save_reports_encoding_failure() {
        let store = CookieStore::new(options, Arc::new(BrokenEncoder)).unwrap();
        let mut headers = HeaderMap::new();

        let result = store.save(&mut headers, &Session::new("user-1", Duration::from_secs(60)));
        assert!(matches!(result, Err(SessionError::Encoding { .. })));
        assert!(headers.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_oversized_session_not_saved() {
        let mut session = Session::new("user-1", Duration::from_secs(60));
        session.custom.insert(
            "blob".to_string(),
            serde_json::Value::from("x".repeat(MAX_CHUNK_SIZE * MAX_NUM_CHUNKS)),
        );

        let mut headers = HeaderMap::new();
        assert!(store().save(&mut headers, &session).is_ok());
        assert!(headers.get(SET_COOKIE).is_none());
    }

    #[test]
    fn test_clear_expires_every_chunk() {
        let mut headers = HeaderMap::new();
        store().clear(&mut headers);

        let cookies: Vec<Cookie<'static>> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
            .collect();
        assert_eq!(cookies.len(), MAX_NUM_CHUNKS);
        assert!(cookies
            .iter()
            .all(|c| c.value().is_empty() && c.max_age() == Some(cookie::time::Duration::ZERO)));
    }
}
