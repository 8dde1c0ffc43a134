//! Metrics collection and reporting

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;
use vigilis_core::{ClassificationResult, MetricsRecorder, Tier};

pub const INVOCATIONS: &str = "vigilis_tier_invocations_total";
pub const ERRORS: &str = "vigilis_tier_errors_total";
pub const RESULTS: &str = "vigilis_results_total";
pub const LATENCY: &str = "vigilis_classification_latency_us";
pub const OFF_CATALOG: &str = "vigilis_off_catalog_answers_total";
pub const DEGRADED: &str = "vigilis_degraded_results_total";

pub const REQUESTS: &str = "vigilis_requests_total";
pub const REQUEST_LATENCY: &str = "vigilis_request_latency_seconds";
pub const REQUEST_ERRORS: &str = "vigilis_request_errors_total";
pub const INPUT_LENGTH: &str = "vigilis_input_length_chars";

/// Register descriptions with the installed `metrics` recorder
pub fn describe_metrics() {
    metrics::describe_counter!(INVOCATIONS, "Number of times each tier was asked to classify a record");
    metrics::describe_counter!(ERRORS, "Tier failures by tier and error kind");
    metrics::describe_counter!(RESULTS, "Final results by deciding tier and label");
    metrics::describe_histogram!(
        LATENCY,
        metrics::Unit::Microseconds,
        "Per-record classification latency in microseconds by deciding tier"
    );
    metrics::describe_counter!(
        OFF_CATALOG,
        "Reasoning answers outside the label catalog, coerced to Unclassified"
    );
    metrics::describe_counter!(DEGRADED, "Final results carrying an error note, by tier");

    metrics::describe_counter!(REQUESTS, "HTTP requests by method and route");
    metrics::describe_histogram!(
        REQUEST_LATENCY,
        metrics::Unit::Seconds,
        "HTTP request latency by route"
    );
    metrics::describe_counter!(REQUEST_ERRORS, "HTTP requests answered with an error, by kind");
    metrics::describe_histogram!(
        INPUT_LENGTH,
        metrics::Unit::Count,
        "Length of submitted log messages in characters"
    );
}

/// Metrics collector for the cascade
///
/// Keeps in-process totals for snapshots and forwards every event to the
/// `metrics` facade. Cloning shares the same totals.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    invocations: [AtomicU64; 4],
    errors: [AtomicU64; 4],
    results: [AtomicU64; 4],
    latency_us: [AtomicU64; 4],
    degraded: AtomicU64,
    off_catalog: AtomicU64,
    requests: AtomicU64,
    request_errors: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counters: &[AtomicU64; 4], tier: Tier| counters[tier.index()].load(Ordering::Relaxed);

        let tiers = Tier::ALL
            .iter()
            .map(|&tier| TierSnapshot {
                tier,
                invocations: load(&self.inner.invocations, tier),
                errors: load(&self.inner.errors, tier),
                results: load(&self.inner.results, tier),
                latency_us: load(&self.inner.latency_us, tier),
            })
            .collect();

        MetricsSnapshot {
            tiers,
            degraded: self.inner.degraded.load(Ordering::Relaxed),
            off_catalog: self.inner.off_catalog.load(Ordering::Relaxed),
            requests: self.inner.requests.load(Ordering::Relaxed),
            request_errors: self.inner.request_errors.load(Ordering::Relaxed),
        }
    }

    /// Record an incoming HTTP request
    pub fn record_request(&self, method: &'static str, route: &'static str) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(REQUESTS, "method" => method, "route" => route).increment(1);
    }

    /// Record how long a request took to answer
    pub fn record_request_latency(&self, route: &'static str, elapsed: Duration) {
        metrics::histogram!(REQUEST_LATENCY, "route" => route).record(elapsed.as_secs_f64());
    }

    /// Record a request answered with an error
    pub fn record_request_error(&self, kind: &'static str) {
        self.inner.request_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(REQUEST_ERRORS, "kind" => kind).increment(1);
    }

    /// Record the length of one submitted log message
    pub fn record_input_length(&self, chars: usize) {
        metrics::histogram!(INPUT_LENGTH).record(chars as f64);
    }
}

impl MetricsRecorder for MetricsCollector {
    fn record_invocation(&self, tier: Tier) {
        self.inner.invocations[tier.index()].fetch_add(1, Ordering::Relaxed);
        metrics::counter!(INVOCATIONS, "tier" => tier.as_str()).increment(1);
    }

    fn record_tier_error(&self, tier: Tier, kind: &str) {
        self.inner.errors[tier.index()].fetch_add(1, Ordering::Relaxed);
        metrics::counter!(ERRORS, "tier" => tier.as_str(), "kind" => kind.to_string()).increment(1);
    }

    fn record_result(&self, result: &ClassificationResult) {
        let i = result.tier.index();
        self.inner.results[i].fetch_add(1, Ordering::Relaxed);
        self.inner.latency_us[i].fetch_add(result.latency_us, Ordering::Relaxed);
        if result.has_error() {
            self.inner.degraded.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(DEGRADED, "tier" => result.tier.as_str()).increment(1);
        }

        metrics::counter!(RESULTS, "tier" => result.tier.as_str(), "label" => result.label.clone())
            .increment(1);
        metrics::histogram!(LATENCY, "tier" => result.tier.as_str()).record(result.latency_us as f64);
    }

    fn record_off_catalog(&self, answer: &str) {
        self.inner.off_catalog.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(OFF_CATALOG).increment(1);
        trace!(answer, "Off-catalog answer recorded");
    }
}

/// Totals for one tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierSnapshot {
    pub tier: Tier,
    pub invocations: u64,
    pub errors: u64,
    pub results: u64,
    pub latency_us: u64,
}

impl TierSnapshot {
    /// Average latency of records this tier decided
    pub fn avg_latency_us(&self) -> u64 {
        if self.results == 0 {
            0
        } else {
            self.latency_us / self.results
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub tiers: Vec<TierSnapshot>,
    pub degraded: u64,
    pub off_catalog: u64,
    pub requests: u64,
    pub request_errors: u64,
}

impl MetricsSnapshot {
    /// Totals for `tier`
    pub fn tier(&self, tier: Tier) -> Option<&TierSnapshot> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    /// Records that reached a final result
    pub fn total_results(&self) -> u64 {
        self.tiers.iter().map(|t| t.results).sum()
    }

    /// Fraction of results served without a reasoning call
    pub fn cheap_tier_rate(&self) -> f64 {
        let total = self.total_results();
        if total == 0 {
            return 0.0;
        }
        let reasoning = self.tier(Tier::Reasoning).map_or(0, |t| t.results);
        (total - reasoning) as f64 / total as f64
    }
}
