//! Reconfiguration
//!
//! Each new configuration is turned into a complete [`ProxyState`] before
//! anything is published. A rejected configuration leaves the running
//! generation in place.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::Config;
use crate::error::ProxyStateError;
use crate::observability::StateMetrics;
use crate::state::{AtomicProxyState, ProxyState};

/// Applies configurations to a published [`AtomicProxyState`].
#[derive(Debug)]
pub struct StateReloader {
    state: Arc<AtomicProxyState>,
    metrics: StateMetrics,
}

impl StateReloader {
    /// Wraps an already published state.
    pub fn new(state: Arc<AtomicProxyState>, metrics: StateMetrics) -> Self {
        Self { state, metrics }
    }

    /// Builds the first generation and wraps it for publication.
    ///
    /// # Errors
    ///
    /// Any `ProxyStateError` from the build; there is no previous state to
    /// fall back on.
    pub fn bootstrap(config: &Config, metrics: StateMetrics) -> Result<Self, ProxyStateError> {
        let state = Self::build(config, &metrics)?;
        metrics.record_published();
        Ok(Self::new(Arc::new(AtomicProxyState::new(state)), metrics))
    }

    /// Handle readers load from
    pub fn state(&self) -> &Arc<AtomicProxyState> {
        &self.state
    }

    /// Build and publication metrics
    pub fn metrics(&self) -> &StateMetrics {
        &self.metrics
    }

    /// Builds a new generation from `config` and publishes it.
    ///
    /// # Errors
    ///
    /// Returns the build error. The previously published state is untouched.
    pub fn apply(&self, config: &Config) -> Result<(), ProxyStateError> {
        let next = Self::build(config, &self.metrics)?;
        self.state.store(next);
        self.metrics.record_published();
        info!(generation = self.metrics.generation.get(), "Proxy state reloaded");
        Ok(())
    }

    fn build(config: &Config, metrics: &StateMetrics) -> Result<Arc<ProxyState>, ProxyStateError> {
        match ProxyState::new(config) {
            Ok(state) => {
                metrics.record_build("ok");
                Ok(Arc::new(state))
            }
            Err(e) => {
                metrics.record_build(e.kind());
                error!(error = %e, kind = e.kind(), "Proxy state rejected, keeping current generation");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;
    use url::Url;

    fn config() -> Config {
        Config {
            shared_secret: "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=".to_string(),
            cookie_secret: "Y29va2llLXNlY3JldC1jb29raWUtc2VjcmV0LTMyYg==".to_string(),
            authorize_url: Some(Url::parse("http://authorize.invalid:5443").unwrap()),
            authenticate_url: Some(Url::parse("https://auth.example.com").unwrap()),
            grpc_insecure: true,
            grpc_client_dns_round_robin: false,
            ..Config::default()
        }
    }

    fn metrics() -> StateMetrics {
        StateMetrics::new(&Registry::new()).unwrap()
    }

    #[tokio::test]
    async fn test_apply_publishes_new_generation() {
        let reloader = StateReloader::bootstrap(&config(), metrics()).unwrap();
        let before = reloader.state().load();

        let mut next = config();
        next.cookie_name = "_next".to_string();
        reloader.apply(&next).unwrap();

        assert!(!Arc::ptr_eq(&before, &reloader.state().load()));
        assert_eq!(reloader.state().load().cookie_options().name, "_next");
        assert_eq!(reloader.metrics().generation.get(), 2.0);
        assert_eq!(reloader.metrics().builds_total.with_label_values(&["ok"]).get(), 2.0);
    }

    #[tokio::test]
    async fn test_rejected_config_keeps_current_state() {
        let reloader = StateReloader::bootstrap(&config(), metrics()).unwrap();
        let before = reloader.state().load();

        let mut bad = config();
        bad.cookie_secret = "%%%".to_string();
        let err = reloader.apply(&bad).unwrap_err();

        assert!(matches!(err, ProxyStateError::Configuration { .. }));
        assert!(Arc::ptr_eq(&before, &reloader.state().load()));
        assert_eq!(reloader.metrics().generation.get(), 1.0);
        assert_eq!(
            reloader.metrics().builds_total.with_label_values(&["configuration"]).get(),
            1.0
        );
    }

    #[test]
    fn test_bootstrap_fails_on_invalid_config() {
        let err = StateReloader::bootstrap(&Config::default(), metrics()).unwrap_err();
        assert!(matches!(err, ProxyStateError::Validation { .. }));
    }
}
