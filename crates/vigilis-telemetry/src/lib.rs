//! Vigilis Telemetry
//!
//! Metrics for the classification cascade.
//!
//! Provides:
//! - Per-tier invocation, error, and result counters
//! - Latency totals per deciding tier
//! - Export through the `metrics` facade (Prometheus in the server)

pub mod metrics;

pub use crate::metrics::{describe_metrics, MetricsCollector, MetricsSnapshot, TierSnapshot};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::{MetricsCollector, MetricsSnapshot};
}
