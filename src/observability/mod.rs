//! Logging and metrics
//!
//! Structured tracing setup plus the Prometheus metrics emitted when state
//! generations are built and published.

pub mod metrics;
pub mod telemetry;

pub use metrics::StateMetrics;
pub use telemetry::{init_tracing, TracingConfig};
