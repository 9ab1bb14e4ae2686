//! Type-Safe Configuration with Validation
//!
//! Provides the configuration a [`crate::ProxyState`] is built from, loaded
//! from environment variables. Validation is deferred to the state builder so
//! that a rejected reload never disturbs the running generation.

use std::env;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::ProxyStateError;

/// Default session cookie name
pub const DEFAULT_COOKIE_NAME: &str = "_pomerium";

/// Proxy configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    /// Base64 shared secret between proxy and authenticate service
    pub shared_secret: String,
    /// Base64 cookie encryption secret
    pub cookie_secret: String,
    /// Session cookie name
    pub cookie_name: String,
    /// Session cookie domain (empty for host-only)
    pub cookie_domain: String,
    /// Mark session cookies `Secure`
    pub cookie_secure: bool,
    /// Mark session cookies `HttpOnly`
    pub cookie_http_only: bool,
    /// Session cookie lifetime
    pub cookie_expire: Duration,
    /// Minimum time between session refresh attempts
    pub refresh_cooldown: Duration,
    /// Claims republished as `x-pomerium-claim-*` headers
    pub jwt_claims_headers: Vec<String>,
    /// Authorize service URL
    pub authorize_url: Option<Url>,
    /// Authenticate service URL
    pub authenticate_url: Option<Url>,
    /// TLS server name override for the authorize channel
    pub override_certificate_name: Option<String>,
    /// Base64-encoded PEM CA bundle
    pub ca: Option<String>,
    /// Path to a PEM CA bundle
    pub ca_file: Option<String>,
    /// Per-request timeout for the authorize channel
    pub grpc_client_timeout: Duration,
    /// Balance the authorize channel across every resolved address
    pub grpc_client_dns_round_robin: bool,
    /// Use plaintext for the authorize channel
    pub grpc_insecure: bool,
    /// Logical service name sent with authorize calls
    pub services: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shared_secret: String::new(),
            cookie_secret: String::new(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_domain: String::new(),
            cookie_secure: true,
            cookie_http_only: true,
            cookie_expire: Duration::from_secs(14 * 60 * 60),
            refresh_cooldown: Duration::from_secs(5 * 60),
            jwt_claims_headers: Vec::new(),
            authorize_url: None,
            authenticate_url: None,
            override_certificate_name: None,
            ca: None,
            ca_file: None,
            grpc_client_timeout: Duration::from_secs(10),
            grpc_client_dns_round_robin: true,
            grpc_insecure: false,
            services: "proxy".to_string(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("shared_secret", &redacted(&self.shared_secret))
            .field("cookie_secret", &redacted(&self.cookie_secret))
            .field("cookie_name", &self.cookie_name)
            .field("cookie_domain", &self.cookie_domain)
            .field("cookie_secure", &self.cookie_secure)
            .field("cookie_http_only", &self.cookie_http_only)
            .field("cookie_expire", &self.cookie_expire)
            .field("refresh_cooldown", &self.refresh_cooldown)
            .field("jwt_claims_headers", &self.jwt_claims_headers)
            .field("authorize_url", &self.authorize_url.as_ref().map(Url::as_str))
            .field("authenticate_url", &self.authenticate_url_str())
            .field("override_certificate_name", &self.override_certificate_name)
            .field("ca", &self.ca.as_ref().map(|_| REDACTED))
            .field("ca_file", &self.ca_file)
            .field("grpc_client_timeout", &self.grpc_client_timeout)
            .field("grpc_client_dns_round_robin", &self.grpc_client_dns_round_robin)
            .field("grpc_insecure", &self.grpc_insecure)
            .field("services", &self.services)
            .finish()
    }
}

const REDACTED: &str = "[REDACTED]";

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { REDACTED }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Validation` when a variable is present but
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ProxyStateError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Validation` when a variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ProxyStateError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            shared_secret: lookup("SHARED_SECRET").unwrap_or_default(),
            cookie_secret: lookup("COOKIE_SECRET").unwrap_or_default(),
            cookie_name: lookup("COOKIE_NAME").unwrap_or(defaults.cookie_name),
            cookie_domain: lookup("COOKIE_DOMAIN").unwrap_or_default(),
            cookie_secure: parse_var(&lookup, "COOKIE_SECURE", defaults.cookie_secure)?,
            cookie_http_only: parse_var(&lookup, "COOKIE_HTTP_ONLY", defaults.cookie_http_only)?,
            cookie_expire: parse_secs(&lookup, "COOKIE_EXPIRE", defaults.cookie_expire)?,
            refresh_cooldown: parse_secs(&lookup, "REFRESH_COOLDOWN", defaults.refresh_cooldown)?,
            jwt_claims_headers: parse_list(&lookup, "JWT_CLAIMS_HEADERS"),
            authorize_url: parse_url(&lookup, "AUTHORIZE_SERVICE_URL")?,
            authenticate_url: parse_url(&lookup, "AUTHENTICATE_SERVICE_URL")?,
            override_certificate_name: non_empty(lookup("OVERRIDE_CERTIFICATE_NAME")),
            ca: non_empty(lookup("CERTIFICATE_AUTHORITY")),
            ca_file: non_empty(lookup("CERTIFICATE_AUTHORITY_FILE")),
            grpc_client_timeout: parse_secs(
                &lookup,
                "GRPC_CLIENT_TIMEOUT",
                defaults.grpc_client_timeout,
            )?,
            grpc_client_dns_round_robin: parse_var(
                &lookup,
                "GRPC_CLIENT_DNS_ROUNDROBIN",
                defaults.grpc_client_dns_round_robin,
            )?,
            grpc_insecure: parse_var(&lookup, "GRPC_INSECURE", defaults.grpc_insecure)?,
            services: lookup("SERVICES").unwrap_or(defaults.services),
        })
    }

    /// Validates the configuration, reporting the first violated constraint.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Validation`.
    pub fn validate(&self) -> Result<(), ProxyStateError> {
        if self.shared_secret.is_empty() {
            return Err(ProxyStateError::validation("shared secret is required"));
        }
        if self.cookie_secret.is_empty() {
            return Err(ProxyStateError::validation("cookie secret is required"));
        }
        validate_service_url("authenticate", self.authenticate_url.as_ref())?;
        validate_service_url("authorize", self.authorize_url.as_ref())?;
        if self.cookie_name.is_empty() {
            return Err(ProxyStateError::validation("cookie name is required"));
        }
        if self.grpc_client_timeout.is_zero() {
            return Err(ProxyStateError::validation(
                "grpc client timeout must be greater than 0",
            ));
        }
        if self.ca.is_some() && self.ca_file.is_some() {
            return Err(ProxyStateError::validation(
                "certificate authority and certificate authority file are mutually exclusive",
            ));
        }
        Ok(())
    }

    /// Authenticate URL, if configured.
    #[must_use]
    pub fn authenticate_url_str(&self) -> Option<&str> {
        self.authenticate_url.as_ref().map(Url::as_str)
    }
}

fn validate_service_url(service: &str, url: Option<&Url>) -> Result<(), ProxyStateError> {
    let url = url.ok_or_else(|| ProxyStateError::validation(format!("{service} url is required")))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ProxyStateError::validation(format!(
            "{service} url has invalid scheme '{scheme}': must be http or https"
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ProxyStateError::validation(format!(
            "{service} url must include a host"
        )));
    }
    Ok(())
}

/// Parse a variable with a default value.
fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ProxyStateError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(val) => val.trim().parse().map_err(|e: T::Err| {
            ProxyStateError::validation(format!("failed to parse {name}: {e}"))
        }),
        None => Ok(default),
    }
}

/// Parse a whole-second duration with a default value.
fn parse_secs<F>(lookup: &F, name: &str, default: Duration) -> Result<Duration, ProxyStateError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, name, default.as_secs()).map(Duration::from_secs)
}

/// Parse an optional URL variable.
fn parse_url<F>(lookup: &F, name: &str) -> Result<Option<Url>, ProxyStateError>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup(name))
        .map(|raw| {
            Url::parse(&raw).map_err(|e| {
                ProxyStateError::validation(format!("invalid URL for {name}: {e}"))
            })
        })
        .transpose()
}

/// Parse a comma-separated list variable.
fn parse_list<F>(lookup: &F, name: &str) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
