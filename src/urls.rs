//! Well-known authenticate service endpoints.

use url::Url;

use crate::error::ProxyStateError;

/// User dashboard
pub const DASHBOARD_PATH: &str = "/.pomerium/";
/// Sign-in endpoint
pub const SIGNIN_PATH: &str = "/.pomerium/sign_in";
/// Sign-out endpoint
pub const SIGNOUT_PATH: &str = "/.pomerium/sign_out";
/// Session refresh endpoint
pub const REFRESH_PATH: &str = "/.pomerium/refresh";

/// Endpoints derived from the authenticate base URL.
///
/// Each one shares scheme, host and port with the base; only the path
/// differs. Query and fragment are dropped by reference resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateUrls {
    /// User dashboard
    pub dashboard: Url,
    /// Sign-in endpoint
    pub signin: Url,
    /// Sign-out endpoint
    pub signout: Url,
    /// Session refresh endpoint
    pub refresh: Url,
}

impl AuthenticateUrls {
    /// Resolves every well-known path against `base`.
    ///
    /// # Errors
    ///
    /// Returns `ProxyStateError::Validation` if `base` cannot act as a base
    /// URL (e.g. `data:` URLs).
    pub fn resolve(base: &Url) -> Result<Self, ProxyStateError> {
        Ok(Self {
            dashboard: join(base, DASHBOARD_PATH)?,
            signin: join(base, SIGNIN_PATH)?,
            signout: join(base, SIGNOUT_PATH)?,
            refresh: join(base, REFRESH_PATH)?,
        })
    }
}

fn join(base: &Url, path: &str) -> Result<Url, ProxyStateError> {
    base.join(path).map_err(|e| {
        ProxyStateError::validation(format!("cannot resolve {path} against authenticate url: {e}"))
    })
}

/// `host[:port]`, with the port only when it is non-default.
///
/// URL parsing drops a default port, so `https://auth.example.com:443` and
/// `https://auth.example.com` both yield `auth.example.com`. Peers that keep
/// the port as written are covered by [`host_aliases`].
#[must_use]
pub fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Other spellings of [`host_with_port`] that name the same authority:
/// `host:<default port>` when the port is the scheme default.
#[must_use]
pub fn host_aliases(url: &Url) -> Vec<String> {
    let host = url.host_str().unwrap_or_default();
    match (url.port(), url.port_or_known_default()) {
        (None, Some(default)) => vec![format!("{host}:{default}")],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_replace_base_path() {
        let base = Url::parse("https://auth.example.com/some/base?x=1#frag").unwrap();
        let urls = AuthenticateUrls::resolve(&base).unwrap();

        assert_eq!(urls.dashboard.as_str(), "https://auth.example.com/.pomerium/");
        assert_eq!(urls.signin.as_str(), "https://auth.example.com/.pomerium/sign_in");
        assert_eq!(urls.signout.as_str(), "https://auth.example.com/.pomerium/sign_out");
        assert_eq!(urls.refresh.as_str(), "https://auth.example.com/.pomerium/refresh");
    }

    #[test]
    fn test_explicit_port_preserved() {
        let base = Url::parse("http://auth.internal:8443/").unwrap();
        let urls = AuthenticateUrls::resolve(&base).unwrap();

        assert_eq!(urls.signin.port(), Some(8443));
        assert_eq!(urls.signin.host_str(), Some("auth.internal"));
        assert_eq!(urls.signin.scheme(), "http");
    }

    #[test]
    fn test_host_with_port() {
        assert_eq!(
            host_with_port(&Url::parse("https://auth.example.com:8443/x").unwrap()),
            "auth.example.com:8443"
        );
        assert_eq!(
            host_with_port(&Url::parse("https://auth.example.com:443/x").unwrap()),
            "auth.example.com"
        );
    }

    #[test]
    fn test_host_aliases() {
        assert_eq!(
            host_aliases(&Url::parse("https://auth.example.com:443/x").unwrap()),
            vec!["auth.example.com:443"]
        );
        assert_eq!(
            host_aliases(&Url::parse("http://auth.example.com").unwrap()),
            vec!["auth.example.com:80"]
        );
        assert!(host_aliases(&Url::parse("https://auth.example.com:8443").unwrap()).is_empty());
    }
}
