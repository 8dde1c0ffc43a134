//! Observability seam between the cascade and whatever exports metrics

use crate::types::{ClassificationResult, Tier};

/// Sink for per-tier counters and latency samples
///
/// The cascade calls into this; it never owns the transport.
pub trait MetricsRecorder: Send + Sync {
    /// A tier was asked to classify a record
    fn record_invocation(&self, tier: Tier);

    /// A tier failed; `kind` is a short stable error name
    fn record_tier_error(&self, tier: Tier, kind: &str);

    /// A record reached its final result
    fn record_result(&self, result: &ClassificationResult);

    /// The reasoning tier answered with a label outside the catalog
    fn record_off_catalog(&self, _answer: &str) {}
}

/// Recorder that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl MetricsRecorder for NoopRecorder {
    fn record_invocation(&self, _tier: Tier) {}

    fn record_tier_error(&self, _tier: Tier, _kind: &str) {}

    fn record_result(&self, _result: &ClassificationResult) {}
}
