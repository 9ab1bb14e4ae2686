//! Proxy State - security configuration snapshots for an identity-aware proxy.
//!
//! This crate turns proxy configuration into an immutable [`ProxyState`]
//! (signing keys, cookie policy, authenticate endpoints, session loaders and
//! a lazily-connected authorize channel) and publishes it through
//! [`AtomicProxyState`] so request handlers always read one consistent
//! generation.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authorize;
pub mod config;
pub mod crypto;
pub mod error;
pub mod observability;
pub mod reload;
pub mod sessions;
pub mod signals;
pub mod state;
pub mod urls;

pub use authorize::{AuthorizeClient, GrpcOptions};
pub use config::Config;
pub use crypto::{CryptoError, JwsEncoder, SharedCipher};
pub use error::{ErrorCode, ProxyStateError, SessionError};
pub use reload::StateReloader;
pub use sessions::{LoaderChain, Session, SessionLoader, SessionStore};
pub use state::{AtomicProxyState, ProxyState};
