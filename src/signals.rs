//! Process signal handling
//!
//! `SIGHUP` asks for a configuration reload. `SIGINT` and `SIGTERM` end the
//! process.

use tokio::signal;
use tracing::info;

/// What the process was asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Rebuild state from fresh configuration
    Reload,
    /// Stop
    Shutdown,
}

/// Registered signal streams.
///
/// Streams are installed once so that signals arriving between two waits
/// are not lost.
#[derive(Debug)]
pub struct SignalListener {
    #[cfg(unix)]
    hangup: signal::unix::Signal,
    #[cfg(unix)]
    terminate: signal::unix::Signal,
}

impl SignalListener {
    /// Installs the handlers. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if a handler cannot be registered.
    pub fn new() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use signal::unix::{signal, SignalKind};
            Ok(Self {
                hangup: signal(SignalKind::hangup())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Waits for the next signal of interest.
    pub async fn recv(&mut self) -> Signal {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.hangup.recv() => {
                    info!("Received SIGHUP, reloading configuration");
                    Signal::Reload
                }
                _ = self.terminate.recv() => {
                    info!("Received SIGTERM, shutting down");
                    Signal::Shutdown
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                    Signal::Shutdown
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = signal::ctrl_c().await;
            info!("Received Ctrl+C, shutting down");
            Signal::Shutdown
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_installs() {
        assert!(SignalListener::new().is_ok());
    }
}
