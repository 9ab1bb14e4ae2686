//! Proxy State - Main Entry Point
//!
//! Builds the initial proxy state from the environment, then reloads it on
//! `SIGHUP` until asked to stop.

use anyhow::Context;
use prometheus::Registry;
use tracing::{error, info, warn};

use proxy_state::config::Config;
use proxy_state::observability::{init_tracing, StateMetrics, TracingConfig};
use proxy_state::signals::{Signal, SignalListener};
use proxy_state::StateReloader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let tracing_config = TracingConfig::from_lookup(|name| std::env::var(name).ok())
        .with_service_name("proxy-state");
    init_tracing(&tracing_config).context("failed to initialize tracing")?;

    let registry = Registry::new();
    let metrics = StateMetrics::new(&registry).context("failed to register metrics")?;

    let config = Config::from_env().context("failed to load configuration")?;
    let reloader =
        StateReloader::bootstrap(&config, metrics).context("failed to build proxy state")?;

    let state = reloader.state().load();
    info!(
        authenticate = %state.authenticate_url(),
        authorize = %state.authorize_url(),
        "Proxy state ready"
    );

    let mut signals = SignalListener::new().context("failed to install signal handlers")?;
    loop {
        match signals.recv().await {
            Signal::Reload => match Config::from_env() {
                Ok(config) => {
                    if let Err(e) = reloader.apply(&config) {
                        warn!(kind = e.kind(), "Reload rejected, previous state still serving");
                    }
                }
                Err(e) => error!(error = %e, "Failed to reload configuration"),
            },
            Signal::Shutdown => break,
        }
    }

    info!("Proxy state stopped");
    Ok(())
}
