//! Proxy state snapshots and their publication
//!
//! A [`ProxyState`] is built completely off to the side and only then handed
//! to [`AtomicProxyState::store`]. Readers hold an `Arc` to whichever
//! generation they loaded, so a reload never changes state under an
//! in-flight request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use crate::authorize::{AuthorizeClient, GrpcOptions};
use crate::config::Config;
use crate::crypto::{JwsEncoder, SharedCipher};
use crate::error::ProxyStateError;
use crate::sessions::header::AUTHORIZATION_TYPE_POMERIUM;
use crate::sessions::query::SESSION_QUERY_PARAM;
use crate::sessions::{
    CookieOptions, CookieStore, Encoder, HeaderStore, LoaderChain, QueryParamStore, Session,
    SessionLoader, SessionStore,
};
use crate::urls::{host_aliases, host_with_port, AuthenticateUrls};

/// Prefix of headers rendered from session claims
pub const CLAIM_HEADER_PREFIX: &str = "x-pomerium-claim-";

/// Immutable security state for one configuration generation.
pub struct ProxyState {
    shared_key: String,
    shared_cipher: SharedCipher,

    authorize_url: Url,
    authenticate_url: Url,
    authenticate_urls: AuthenticateUrls,

    encoder: Arc<JwsEncoder>,
    cookie_secret: Vec<u8>,
    refresh_cooldown: Duration,
    session_store: Arc<CookieStore>,
    session_loaders: LoaderChain,
    jwt_claim_headers: Vec<String>,
    authz_client: AuthorizeClient,
}

impl ProxyState {
    /// Builds a snapshot from `config`.
    ///
    /// Steps run in a fixed order and the first failure aborts the build;
    /// nothing partially built is ever returned. Must be called from within
    /// a Tokio runtime because the authorize channel is prepared here.
    ///
    /// # Errors
    ///
    /// - `ProxyStateError::Validation` if the configuration is rejected
    /// - `ProxyStateError::Configuration` for malformed secrets
    /// - `ProxyStateError::Connection` if the authorize channel cannot be prepared
    #[instrument(skip_all, fields(authenticate = config.authenticate_url_str().unwrap_or_default()))]
    pub fn new(config: &Config) -> Result<Self, ProxyStateError> {
        config.validate()?;

        let (authorize_url, authenticate_url) =
            match (&config.authorize_url, &config.authenticate_url) {
                (Some(authorize), Some(authenticate)) => (authorize.clone(), authenticate.clone()),
                _ => return Err(ProxyStateError::validation("service urls are required")),
            };

        let shared_cipher = SharedCipher::from_base64(&config.shared_secret)?;
        let mut encoder =
            JwsEncoder::new(config.shared_secret.as_bytes(), host_with_port(&authenticate_url))?;
        for alias in host_aliases(&authenticate_url) {
            encoder = encoder.with_accepted_audience(alias);
        }
        let encoder = Arc::new(encoder);

        let cookie_secret = STANDARD.decode(config.cookie_secret.trim()).map_err(|e| {
            ProxyStateError::configuration(format!("cookie secret is not valid base64: {e}"))
        })?;

        let authenticate_urls = AuthenticateUrls::resolve(&authenticate_url)?;

        let session_store = Arc::new(CookieStore::new(
            || CookieOptions {
                name: config.cookie_name.clone(),
                domain: config.cookie_domain.clone(),
                secure: config.cookie_secure,
                http_only: config.cookie_http_only,
                expire: config.cookie_expire,
            },
            Arc::clone(&encoder) as Arc<dyn Encoder>,
        )?);

        let session_loaders = LoaderChain::new(vec![
            Arc::clone(&session_store) as Arc<dyn SessionLoader>,
            Arc::new(HeaderStore::new(
                Arc::clone(&encoder) as Arc<dyn Encoder>,
                AUTHORIZATION_TYPE_POMERIUM,
            )) as Arc<dyn SessionLoader>,
            Arc::new(QueryParamStore::new(
                Arc::clone(&encoder) as Arc<dyn Encoder>,
                SESSION_QUERY_PARAM,
            )) as Arc<dyn SessionLoader>,
        ]);

        let authz_client = AuthorizeClient::connect(
            "authorize",
            &GrpcOptions {
                addr: authorize_url.clone(),
                override_certificate_name: config.override_certificate_name.clone(),
                ca: config.ca.clone(),
                ca_file: config.ca_file.clone(),
                request_timeout: config.grpc_client_timeout,
                client_dns_round_robin: config.grpc_client_dns_round_robin,
                with_insecure: config.grpc_insecure,
                service_name: config.services.clone(),
            },
        )?;

        debug!(
            authorize = %authorize_url,
            signin = %authenticate_urls.signin,
            "Proxy state built"
        );

        Ok(Self {
            shared_key: config.shared_secret.clone(),
            shared_cipher,
            authorize_url,
            authenticate_url,
            authenticate_urls,
            encoder,
            cookie_secret,
            refresh_cooldown: config.refresh_cooldown,
            session_store,
            session_loaders,
            jwt_claim_headers: config.jwt_claims_headers.clone(),
            authz_client,
        })
    }

    /// Raw base64 shared secret
    pub fn shared_key(&self) -> &str {
        &self.shared_key
    }

    /// AEAD cipher derived from the shared secret
    pub fn shared_cipher(&self) -> &SharedCipher {
        &self.shared_cipher
    }

    /// Authorize service URL
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    /// Authenticate service URL as configured
    pub fn authenticate_url(&self) -> &Url {
        &self.authenticate_url
    }

    /// `/.pomerium/` on the authenticate host
    pub fn authenticate_dashboard_url(&self) -> &Url {
        &self.authenticate_urls.dashboard
    }

    /// `/.pomerium/sign_in` on the authenticate host
    pub fn authenticate_signin_url(&self) -> &Url {
        &self.authenticate_urls.signin
    }

    /// `/.pomerium/sign_out` on the authenticate host
    pub fn authenticate_signout_url(&self) -> &Url {
        &self.authenticate_urls.signout
    }

    /// `/.pomerium/refresh` on the authenticate host
    pub fn authenticate_refresh_url(&self) -> &Url {
        &self.authenticate_urls.refresh
    }

    /// Signer/verifier bound to the authenticate host
    pub fn encoder(&self) -> &JwsEncoder {
        &self.encoder
    }

    /// Decoded cookie secret
    pub fn cookie_secret(&self) -> &[u8] {
        &self.cookie_secret
    }

    /// Minimum time between session refreshes
    pub fn refresh_cooldown(&self) -> Duration {
        self.refresh_cooldown
    }

    /// Cookie store; also the first loader in the chain
    pub fn session_store(&self) -> &dyn SessionStore {
        self.session_store.as_ref()
    }

    /// Cookie policy of this generation
    pub fn cookie_options(&self) -> &CookieOptions {
        self.session_store.options()
    }

    /// Loaders in precedence order: cookie, header, query parameter
    pub fn session_loaders(&self) -> &LoaderChain {
        &self.session_loaders
    }

    /// Claims republished as headers
    pub fn jwt_claim_headers(&self) -> &[String] {
        &self.jwt_claim_headers
    }

    /// Authorize service client
    pub fn authz_client(&self) -> &AuthorizeClient {
        &self.authz_client
    }

    /// Renders the configured claims as `x-pomerium-claim-<name>` headers.
    ///
    /// Claims absent from the session, or whose rendered value is not a
    /// legal header, are skipped.
    #[must_use]
    pub fn claim_headers(&self, session: &Session) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for claim in &self.jwt_claim_headers {
            let Some(value) = session.claim(claim).and_then(|v| render_claim(&v)) else {
                continue;
            };
            let name = format!("{CLAIM_HEADER_PREFIX}{}", claim.to_ascii_lowercase());
            if let (Ok(name), Ok(value)) =
                (HeaderName::try_from(name), HeaderValue::from_str(&value))
            {
                headers.insert(name, value);
            }
        }
        headers
    }

    /// True once `refresh_cooldown` has passed since the session was issued.
    #[must_use]
    pub fn refresh_due(&self, session: &Session, now: i64) -> bool {
        let cooldown = i64::try_from(self.refresh_cooldown.as_secs()).unwrap_or(i64::MAX);
        session.iat.saturating_add(cooldown) <= now
    }
}

fn render_claim(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(render_claim)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

impl fmt::Debug for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyState")
            .field("authorize_url", &self.authorize_url.as_str())
            .field("authenticate_url", &self.authenticate_url.as_str())
            .field("cookie", self.cookie_options())
            .field("refresh_cooldown", &self.refresh_cooldown)
            .field("jwt_claim_headers", &self.jwt_claim_headers)
            .finish_non_exhaustive()
    }
}

/// The currently published [`ProxyState`].
///
/// `load` and `store` are lock-free. A reader always gets one whole
/// generation; a superseded generation lives on until its last reader drops
/// it.
pub struct AtomicProxyState {
    value: ArcSwap<ProxyState>,
}

impl AtomicProxyState {
    /// Publishes `state` as the first generation.
    pub fn new(state: Arc<ProxyState>) -> Self {
        Self {
            value: ArcSwap::new(state),
        }
    }

    /// Current generation
    #[must_use]
    pub fn load(&self) -> Arc<ProxyState> {
        self.value.load_full()
    }

    /// Publishes a new generation.
    pub fn store(&self, state: Arc<ProxyState>) {
        self.value.store(state);
        info!("Proxy state published");
    }
}

impl fmt::Debug for AtomicProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicProxyState")
            .field(&*self.value.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            shared_secret: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
            cookie_secret: "Y29va2llLXNlY3JldC1jb29raWUtc2VjcmV0LTMyYg==".to_string(),
            authorize_url: Some(Url::parse("http://authorize.invalid:5443").unwrap()),
            authenticate_url: Some(Url::parse("https://auth.example.com/base").unwrap()),
            jwt_claims_headers: vec!["email".to_string(), "groups".to_string(), "missing".to_string()],
            grpc_insecure: true,
            grpc_client_dns_round_robin: false,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_build_populates_every_field() {
        let state = ProxyState::new(&config()).unwrap();

        assert_eq!(state.authenticate_signin_url().as_str(), "https://auth.example.com/.pomerium/sign_in");
        assert_eq!(state.encoder().audience(), "auth.example.com");
        assert_eq!(state.cookie_secret(), b"cookie-secret-cookie-secret-32b");
        assert_eq!(state.session_loaders().len(), 3);
        assert_eq!(state.cookie_options().name, "_pomerium");
        assert_eq!(state.authz_client().target(), "authorize.invalid:5443");
    }

    #[tokio::test]
    async fn test_unresolvable_authorize_host_builds_with_round_robin() {
        let mut balanced = config();
        balanced.grpc_client_dns_round_robin = true;

        let plain = ProxyState::new(&config()).unwrap();
        let state = ProxyState::new(&balanced).unwrap();

        assert!(state.authz_client().is_round_robin());
        assert_eq!(state.authz_client().target(), plain.authz_client().target());
    }

    #[tokio::test]
    async fn test_claim_headers() {
        let state = ProxyState::new(&config()).unwrap();
        let session = Session {
            email: Some("user@example.com".to_string()),
            groups: Some(vec!["admins".to_string(), "eng".to_string()]),
            ..Session::default()
        };

        let headers = state.claim_headers(&session);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["x-pomerium-claim-email"], "user@example.com");
        assert_eq!(headers["x-pomerium-claim-groups"], "admins,eng");
    }

    #[tokio::test]
    async fn test_refresh_due_after_cooldown() {
        let state = ProxyState::new(&config()).unwrap();
        let session = Session {
            iat: 1_000,
            ..Session::default()
        };

        assert!(!state.refresh_due(&session, 1_000 + 299));
        assert!(state.refresh_due(&session, 1_000 + 300));
    }

    #[tokio::test]
    async fn test_store_replaces_generation() {
        let first = Arc::new(ProxyState::new(&config()).unwrap());
        let cell = AtomicProxyState::new(Arc::clone(&first));

        let mut next_config = config();
        next_config.authenticate_url = Some(Url::parse("https://login.example.com").unwrap());
        let second = Arc::new(ProxyState::new(&next_config).unwrap());
        cell.store(Arc::clone(&second));

        assert!(Arc::ptr_eq(&cell.load(), &second));
        assert_eq!(first.authenticate_url().host_str(), Some("auth.example.com"));
        assert_eq!(
            cell.load().authenticate_signin_url().as_str(),
            "https://login.example.com/.pomerium/sign_in"
        );
    }
}
