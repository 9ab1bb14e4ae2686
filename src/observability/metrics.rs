//! State Publication Metrics
//!
//! Prometheus counters for build outcomes and a gauge tracking the
//! published generation.

use prometheus::{CounterVec, Gauge, Opts, Registry};

const NAMESPACE: &str = "proxy";

/// Metrics recorded by the state reloader
#[derive(Clone)]
pub struct StateMetrics {
    /// Build attempts by `result` (`ok`, `validation`, `configuration`, `connection`)
    pub builds_total: CounterVec,
    /// Number of generations published since startup
    pub generation: Gauge,
}

impl StateMetrics {
    /// Creates the metrics and registers them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let builds_total = CounterVec::new(
            Opts::new("state_builds_total", "Total proxy state build attempts")
                .namespace(NAMESPACE),
            &["result"],
        )?;
        registry.register(Box::new(builds_total.clone()))?;

        let generation = Gauge::with_opts(
            Opts::new("state_generation", "Currently published proxy state generation")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(generation.clone()))?;

        Ok(Self {
            builds_total,
            generation,
        })
    }

    /// Counts one build attempt under `result`
    pub fn record_build(&self, result: &str) {
        self.builds_total.with_label_values(&[result]).inc();
    }

    /// Bumps the published generation
    pub fn record_published(&self) {
        self.generation.inc();
    }
}

impl std::fmt::Debug for StateMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMetrics")
            .field("generation", &self.generation.get())
            .finish_non_exhaustive()
    }
}
