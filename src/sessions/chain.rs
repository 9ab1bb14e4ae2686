//! Ordered session loader chain
//!
//! Loaders are tried in registration order. The first success wins.
//! `NotFound` falls through silently. A decoding failure is remembered and
//! the chain keeps going, so a stale cookie never masks a valid header. If
//! nothing succeeds, the most recent decoding failure is reported ahead of
//! `NotFound`.

use std::sync::Arc;

use http::request::Parts;
use tracing::debug;

use crate::error::SessionError;
use crate::sessions::{Session, SessionLoader};

/// Precedence-ordered list of session loaders.
#[derive(Clone, Default)]
pub struct LoaderChain {
    loaders: Vec<Arc<dyn SessionLoader>>,
}

impl LoaderChain {
    /// Creates a chain; earlier loaders take precedence.
    #[must_use]
    pub fn new(loaders: Vec<Arc<dyn SessionLoader>>) -> Self {
        Self { loaders }
    }

    /// Number of registered loaders
    #[must_use]
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    /// True when no loader is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// The loaders in precedence order
    #[must_use]
    pub fn loaders(&self) -> &[Arc<dyn SessionLoader>] {
        &self.loaders
    }

    /// Resolves a session from the request.
    ///
    /// # Errors
    ///
    /// `SessionError::Decoding` if some source held an invalid credential and
    /// no later source succeeded; `SessionError::NotFound` if no source held
    /// a credential at all.
    pub fn load(&self, request: &Parts) -> Result<Session, SessionError> {
        let mut last_error = None;

        for (position, loader) in self.loaders.iter().enumerate() {
            match loader.load(request) {
                Ok(session) => return Ok(session),
                Err(SessionError::NotFound) => {}
                Err(err) => {
                    debug!(position, error = %err, "Session loader rejected credential");
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or(SessionError::NotFound))
    }
}

impl SessionLoader for LoaderChain {
    fn load(&self, request: &Parts) -> Result<Session, SessionError> {
        Self::load(self, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Loader that returns a canned result.
    struct Fixed(Result<Session, SessionError>);

    impl SessionLoader for Fixed {
        fn load(&self, _request: &Parts) -> Result<Session, SessionError> {
            self.0.clone()
        }
    }

    fn ok(sub: &str) -> Arc<dyn SessionLoader> {
        Arc::new(Fixed(Ok(Session {
            sub: sub.to_string(),
            ..Session::default()
        })))
    }

    fn not_found() -> Arc<dyn SessionLoader> {
        Arc::new(Fixed(Err(SessionError::NotFound)))
    }

    fn bad(reason: &str) -> Arc<dyn SessionLoader> {
        Arc::new(Fixed(Err(SessionError::decoding(reason))))
    }

    fn parts() -> Parts {
        http::Request::builder().body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_first_success_wins() {
        let chain = LoaderChain::new(vec![ok("cookie"), ok("header")]);
        assert_eq!(chain.load(&parts()).unwrap().sub, "cookie");
    }

    #[test]
    fn test_not_found_falls_through() {
        let chain = LoaderChain::new(vec![not_found(), ok("header")]);
        assert_eq!(chain.load(&parts()).unwrap().sub, "header");
    }

    #[test]
    fn test_decode_error_does_not_short_circuit() {
        let chain = LoaderChain::new(vec![bad("expired"), ok("header"), not_found()]);
        assert_eq!(chain.load(&parts()).unwrap().sub, "header");
    }

    #[test]
    fn test_decode_error_beats_not_found() {
        let chain = LoaderChain::new(vec![bad("expired"), not_found(), not_found()]);
        assert_eq!(chain.load(&parts()), Err(SessionError::decoding("expired")));
    }

    #[test]
    fn test_most_recent_decode_error_wins() {
        let chain = LoaderChain::new(vec![bad("first"), not_found(), bad("second")]);
        assert_eq!(chain.load(&parts()), Err(SessionError::decoding("second")));
    }

    #[test]
    fn test_all_not_found() {
        let chain = LoaderChain::new(vec![not_found(), not_found()]);
        assert_eq!(chain.load(&parts()), Err(SessionError::NotFound));
        assert_eq!(LoaderChain::default().load(&parts()), Err(SessionError::NotFound));
    }
}
