//! Cascade orchestrator
//!
//! Drives each record through an explicit state machine:
//!
//! ```text
//! New -> CacheCheck -> PatternCheck -> SemanticCheck -> ReasoningCheck -> Done
//!            |              |                |
//!            +-> Done       +-> Done         +-> Done (confidence >= threshold)
//! ```
//!
//! A more expensive tier is only invoked once every cheaper tier has
//! declined. Everything after `CacheCheck` runs inside the cache's
//! single-flight slot, so concurrent first-time requests for the same
//! normalized text share one pass through the tiers.
//!
//! Batches run with bounded fan-out and keep input order. Semantic inference
//! and reasoning calls each have their own permit pool; once a pool is
//! saturated further work waits for a permit. A batch deadline cuts off
//! records still waiting on the reasoning tier.

use crate::cache::{CacheOrigin, Computed, ResultCache};
use crate::classifier::{CompletionBackend, SemanticClassifier, UnavailableClassifier};
use crate::openai::DisabledBackend;
use crate::patterns::{PatternTier, RuleEntry};
use crate::reasoning::{ReasoningTier, RetryPolicy, REASONING_CONFIDENCE};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};
use vigilis_core::{
    ClassificationResult, Error, LabelCatalog, LogRecord, MetricsRecorder, NoopRecorder, Result,
    Tier, UNCLASSIFIED,
};

/// Confidence assigned to rule matches
pub const PATTERN_CONFIDENCE: f32 = 1.0;

/// Note attached to records cut off by the batch deadline
pub const BATCH_TIMEOUT_NOTE: &str = "batch deadline exceeded while awaiting reasoning tier";

/// Per-record cascade state
#[derive(Debug, Clone, PartialEq)]
pub enum CascadeState {
    /// Record received
    New,
    /// Looking for a stored result
    CacheCheck,
    /// Evaluating rules
    PatternCheck,
    /// Scoring with the semantic model
    SemanticCheck,
    /// Asking the generative service
    ReasoningCheck(Escalation),
    /// Final result reached
    Done(Resolution),
}

/// Why a record left the semantic tier without an accepted label
#[derive(Debug, Clone, PartialEq)]
pub enum Escalation {
    /// Semantic confidence fell below the acceptance threshold
    LowConfidence { label: String, confidence: f32 },
    /// Semantic answer was not a catalog category
    OffCatalog { label: String },
    /// Semantic model missing or failing
    ModelUnavailable,
}

/// Terminal state payload
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Result as produced by the deciding tier (latency not yet set)
    pub result: ClassificationResult,

    /// Whether the result may be kept in the cache
    pub retain: bool,
}

/// Tunables applied by the orchestrator
#[derive(Debug, Clone)]
pub struct CascadeSettings {
    /// Semantic acceptance threshold
    pub threshold: f32,

    /// Records in flight per batch
    pub max_concurrency: usize,

    /// Deadline for one batch (or one single-record call)
    pub batch_timeout: Duration,

    /// Keep results carrying an error note in the cache
    pub cache_errors: bool,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            threshold: 0.75,
            max_concurrency: 64,
            batch_timeout: Duration::from_secs(60),
            cache_errors: false,
        }
    }
}

/// Aggregate view of one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    /// Records classified
    pub total: usize,
    /// Decided by a rule
    pub pattern: usize,
    /// Decided by the semantic model
    pub semantic: usize,
    /// Decided by the reasoning tier
    pub reasoning: usize,
    /// Served from the cache
    pub cache: usize,
    /// Results carrying an error note
    pub errors: usize,
    /// Wall-clock time for the whole batch in microseconds
    pub elapsed_us: u64,
}

impl BatchSummary {
    fn from_results(results: &[ClassificationResult], elapsed: Duration) -> Self {
        let mut summary = Self {
            total: results.len(),
            elapsed_us: elapsed.as_micros() as u64,
            ..Self::default()
        };
        for result in results {
            match result.tier {
                Tier::Pattern => summary.pattern += 1,
                Tier::Semantic => summary.semantic += 1,
                Tier::Reasoning => summary.reasoning += 1,
                Tier::Cache => summary.cache += 1,
            }
            if result.has_error() {
                summary.errors += 1;
            }
        }
        summary
    }
}

/// Results for a batch, in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// One result per input record
    pub results: Vec<ClassificationResult>,

    /// Aggregate counts and latency
    pub summary: BatchSummary,
}

/// The cost-ordered Pattern → Semantic → Reasoning cascade
pub struct CascadeOrchestrator {
    catalog: Arc<LabelCatalog>,
    patterns: PatternTier,
    semantic: Arc<dyn SemanticClassifier>,
    reasoning: ReasoningTier,
    cache: ResultCache,
    recorder: Arc<dyn MetricsRecorder>,
    semantic_permits: Semaphore,
    reasoning_permits: Semaphore,
    settings: CascadeSettings,
}

impl CascadeOrchestrator {
    /// Start building an orchestrator over `catalog`
    pub fn builder(catalog: LabelCatalog) -> CascadeBuilder {
        CascadeBuilder::new(catalog)
    }

    /// Label catalog in use
    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    /// Result cache
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Active settings
    pub fn settings(&self) -> &CascadeSettings {
        &self.settings
    }

    /// Classify raw text
    pub async fn classify_text(&self, text: &str) -> ClassificationResult {
        self.classify(&LogRecord::new(text)).await
    }

    /// Classify one record under its own deadline
    pub async fn classify(&self, record: &LogRecord) -> ClassificationResult {
        let deadline = Instant::now() + self.settings.batch_timeout;
        self.classify_record(record, deadline).await
    }

    /// Classify a batch; one result per record, in input order
    pub async fn classify_batch(&self, records: &[LogRecord]) -> BatchOutcome {
        let start = Instant::now();
        let deadline = start + self.settings.batch_timeout;

        let pending: Vec<_> = records
            .iter()
            .map(|record| self.classify_record(record, deadline))
            .collect();
        let results: Vec<ClassificationResult> = stream::iter(pending)
            .buffered(self.settings.max_concurrency)
            .collect()
            .await;

        let summary = BatchSummary::from_results(&results, start.elapsed());
        debug!(
            total = summary.total,
            pattern = summary.pattern,
            semantic = summary.semantic,
            reasoning = summary.reasoning,
            cache = summary.cache,
            errors = summary.errors,
            "Batch classified"
        );

        BatchOutcome { results, summary }
    }

    /// Run one record from `New` to `Done`
    async fn classify_record(&self, record: &LogRecord, deadline: Instant) -> ClassificationResult {
        let start = Instant::now();
        let key = record.normalized();

        let mut state = CascadeState::New;
        let result = loop {
            state = match state {
                CascadeState::Done(resolution) => break resolution.result,
                CascadeState::PatternCheck => {
                    // Everything from here on runs at most once per key at a time
                    let outcome = self
                        .cache
                        .get_or_compute(key, || async {
                            let resolution = self.resolve_uncached(record, deadline).await;
                            Computed {
                                result: resolution.result,
                                retain: resolution.retain,
                            }
                        })
                        .await;

                    let result = match outcome.origin {
                        CacheOrigin::Computed => outcome.result,
                        CacheOrigin::Hit | CacheOrigin::Joined => served_from_cache(outcome.result),
                    };
                    CascadeState::Done(Resolution { result, retain: true })
                }
                other => self.advance(other, record, deadline).await,
            };
        };

        let result = result.with_latency_us(start.elapsed().as_micros() as u64);
        debug!(
            tier = %result.tier,
            label = %result.label,
            confidence = result.confidence,
            latency_us = result.latency_us,
            "Record classified"
        );
        self.recorder.record_result(&result);
        result
    }

    /// Tier transitions after a cache miss
    async fn resolve_uncached(&self, record: &LogRecord, deadline: Instant) -> Resolution {
        let mut state = CascadeState::PatternCheck;
        loop {
            state = match state {
                CascadeState::Done(resolution) => return resolution,
                other => self.advance(other, record, deadline).await,
            };
        }
    }

    /// Apply one transition of the state machine
    ///
    /// `CacheCheck` only consults stored results here; the single-flight
    /// claim for a miss happens in the caller.
    pub async fn advance(&self, state: CascadeState, record: &LogRecord, deadline: Instant) -> CascadeState {
        let text = record.normalized();

        match state {
            CascadeState::New => CascadeState::CacheCheck,

            CascadeState::CacheCheck => match self.cache.lookup(text) {
                Some(stored) => CascadeState::Done(Resolution {
                    result: served_from_cache(stored),
                    retain: true,
                }),
                None => CascadeState::PatternCheck,
            },

            CascadeState::PatternCheck => {
                self.recorder.record_invocation(Tier::Pattern);
                match self.patterns.matches(text) {
                    Some(m) => {
                        debug!(label = %m.label, priority = m.priority, "Rule matched");
                        CascadeState::Done(Resolution {
                            result: ClassificationResult::new(m.label, PATTERN_CONFIDENCE, Tier::Pattern),
                            retain: true,
                        })
                    }
                    None => CascadeState::SemanticCheck,
                }
            }

            CascadeState::SemanticCheck => {
                self.recorder.record_invocation(Tier::Semantic);
                let prediction = {
                    let _permit = self.semantic_permits.acquire().await;
                    self.semantic.classify(text).await
                };

                match prediction {
                    Ok(prediction) => match self.catalog.resolve(&prediction.label) {
                        Some(label) if label != UNCLASSIFIED => {
                            if prediction.accepted_at(self.settings.threshold) {
                                CascadeState::Done(Resolution {
                                    result: ClassificationResult::new(
                                        label,
                                        prediction.confidence,
                                        Tier::Semantic,
                                    ),
                                    retain: true,
                                })
                            } else {
                                debug!(
                                    label,
                                    confidence = prediction.confidence,
                                    threshold = self.settings.threshold,
                                    "Semantic confidence below threshold, escalating"
                                );
                                CascadeState::ReasoningCheck(Escalation::LowConfidence {
                                    label: label.to_string(),
                                    confidence: prediction.confidence,
                                })
                            }
                        }
                        _ => {
                            warn!(label = %prediction.label, "Semantic tier answered outside the catalog");
                            CascadeState::ReasoningCheck(Escalation::OffCatalog {
                                label: prediction.label,
                            })
                        }
                    },
                    Err(e) => {
                        self.recorder.record_tier_error(Tier::Semantic, e.kind());
                        warn!(classifier = self.semantic.name(), "Semantic tier failed, escalating: {}", e);
                        CascadeState::ReasoningCheck(Escalation::ModelUnavailable)
                    }
                }
            }

            CascadeState::ReasoningCheck(escalation) => {
                self.recorder.record_invocation(Tier::Reasoning);
                debug!(?escalation, "Escalating to reasoning tier");

                let call = async {
                    let _permit = self.reasoning_permits.acquire().await;
                    self.reasoning.classify(text).await
                };

                match tokio::time::timeout_at(deadline, call).await {
                    Ok(outcome) => {
                        let mut result =
                            ClassificationResult::new(outcome.label, REASONING_CONFIDENCE, Tier::Reasoning);
                        if let Some(note) = outcome.error {
                            result = result.with_error(note);
                        }
                        let retain = !result.has_error() || self.settings.cache_errors;
                        CascadeState::Done(Resolution { result, retain })
                    }
                    Err(_) => {
                        self.recorder
                            .record_tier_error(Tier::Reasoning, Error::BatchTimeout.kind());
                        warn!("Batch deadline reached before reasoning tier answered");
                        CascadeState::Done(Resolution {
                            result: ClassificationResult::new(UNCLASSIFIED, 0.0, Tier::Reasoning)
                                .with_error(BATCH_TIMEOUT_NOTE),
                            retain: false,
                        })
                    }
                }
            }

            done @ CascadeState::Done(_) => done,
        }
    }
}

fn served_from_cache(mut result: ClassificationResult) -> ClassificationResult {
    result.tier = Tier::Cache;
    result
}

/// Fluent construction of a [`CascadeOrchestrator`]
pub struct CascadeBuilder {
    catalog: LabelCatalog,
    rules: Vec<RuleEntry>,
    semantic: Option<Arc<dyn SemanticClassifier>>,
    backend: Option<Arc<dyn CompletionBackend>>,
    retry: RetryPolicy,
    recorder: Arc<dyn MetricsRecorder>,
    settings: CascadeSettings,
    semantic_concurrency: usize,
    reasoning_concurrency: usize,
    cache_capacity: usize,
    cache_ttl: Option<Duration>,
}

impl CascadeBuilder {
    /// Create a builder with default tunables
    pub fn new(catalog: LabelCatalog) -> Self {
        Self {
            catalog,
            rules: Vec::new(),
            semantic: None,
            backend: None,
            retry: RetryPolicy::default(),
            recorder: Arc::new(NoopRecorder),
            settings: CascadeSettings::default(),
            semantic_concurrency: num_cpus::get().max(1),
            reasoning_concurrency: 4,
            cache_capacity: crate::cache::DEFAULT_CAPACITY,
            cache_ttl: None,
        }
    }

    /// Pattern tier rules
    pub fn rules(mut self, rules: Vec<RuleEntry>) -> Self {
        self.rules = rules;
        self
    }

    /// Semantic tier implementation
    pub fn semantic(mut self, classifier: Arc<dyn SemanticClassifier>) -> Self {
        self.semantic = Some(classifier);
        self
    }

    /// Reasoning tier backend
    pub fn backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Reasoning retry schedule
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Metrics sink
    pub fn recorder(mut self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Semantic acceptance threshold
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.settings.threshold = threshold;
        self
    }

    /// Records in flight per batch
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.settings.max_concurrency = n;
        self
    }

    /// Concurrent semantic inferences
    pub fn semantic_concurrency(mut self, n: usize) -> Self {
        self.semantic_concurrency = n;
        self
    }

    /// Concurrent reasoning calls
    pub fn reasoning_concurrency(mut self, n: usize) -> Self {
        self.reasoning_concurrency = n;
        self
    }

    /// Batch deadline
    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.settings.batch_timeout = timeout;
        self
    }

    /// Cache capacity and optional expiry
    pub fn cache(mut self, capacity: usize, ttl: Option<Duration>) -> Self {
        self.cache_capacity = capacity;
        self.cache_ttl = ttl;
        self
    }

    /// Keep results carrying an error note in the cache
    pub fn cache_errors(mut self, cache_errors: bool) -> Self {
        self.settings.cache_errors = cache_errors;
        self
    }

    /// Validate and assemble
    pub fn build(self) -> Result<CascadeOrchestrator> {
        if !(0.0..=1.0).contains(&self.settings.threshold) {
            return Err(Error::config(format!(
                "threshold must be within [0, 1], got {}",
                self.settings.threshold
            )));
        }
        if self.settings.max_concurrency == 0
            || self.semantic_concurrency == 0
            || self.reasoning_concurrency == 0
        {
            return Err(Error::config("concurrency limits must be > 0"));
        }

        let patterns = PatternTier::new(self.rules, &self.catalog)?;
        let catalog = Arc::new(self.catalog);

        let semantic = self
            .semantic
            .unwrap_or_else(|| Arc::new(UnavailableClassifier::new("no semantic model configured")));
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(DisabledBackend::new("no reasoning backend configured")));
        let reasoning = ReasoningTier::new(
            backend,
            Arc::clone(&catalog),
            self.retry,
            Arc::clone(&self.recorder),
        );

        Ok(CascadeOrchestrator {
            catalog,
            patterns,
            semantic,
            reasoning,
            cache: ResultCache::new(self.cache_capacity, self.cache_ttl),
            recorder: self.recorder,
            semantic_permits: Semaphore::new(self.semantic_concurrency),
            reasoning_permits: Semaphore::new(self.reasoning_concurrency),
            settings: self.settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SemanticPrediction;
    use async_trait::async_trait;

    struct FixedSemantic(f32);

    #[async_trait]
    impl SemanticClassifier for FixedSemantic {
        async fn classify(&self, _text: &str) -> Result<SemanticPrediction> {
            Ok(SemanticPrediction::new("Database Error", self.0))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Echo(&'static str);

    #[async_trait]
    impl CompletionBackend for Echo {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn orchestrator(confidence: f32) -> CascadeOrchestrator {
        CascadeOrchestrator::builder(LabelCatalog::new(["Database Error", "Service Outage"]).unwrap())
            .rules(vec![RuleEntry::regex("^database connection", "Database Error", 0)])
            .semantic(Arc::new(FixedSemantic(confidence)))
            .backend(Arc::new(Echo("Service Outage")))
            .threshold(0.75)
            .build()
            .unwrap()
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_transitions_new_to_pattern_done() {
        let cascade = orchestrator(0.9);
        let record = LogRecord::new("Database connection refused");

        let state = cascade.advance(CascadeState::New, &record, far_deadline()).await;
        assert_eq!(state, CascadeState::CacheCheck);

        let state = cascade.advance(state, &record, far_deadline()).await;
        assert_eq!(state, CascadeState::PatternCheck);

        let state = cascade.advance(state, &record, far_deadline()).await;
        match state {
            CascadeState::Done(resolution) => {
                assert_eq!(resolution.result.tier, Tier::Pattern);
                assert_eq!(resolution.result.confidence, PATTERN_CONFIDENCE);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_low_confidence_escalates() {
        let cascade = orchestrator(0.4);
        let record = LogRecord::new("the oracle refuses to speak");

        let state = cascade
            .advance(CascadeState::SemanticCheck, &record, far_deadline())
            .await;
        assert_eq!(
            state,
            CascadeState::ReasoningCheck(Escalation::LowConfidence {
                label: "Database Error".into(),
                confidence: 0.4
            })
        );

        let state = cascade.advance(state, &record, far_deadline()).await;
        match state {
            CascadeState::Done(resolution) => {
                assert_eq!(resolution.result.label, "Service Outage");
                assert_eq!(resolution.result.tier, Tier::Reasoning);
                assert!(resolution.retain);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let cascade = orchestrator(0.75);
        let state = cascade
            .advance(CascadeState::SemanticCheck, &LogRecord::new("x"), far_deadline())
            .await;
        assert!(matches!(state, CascadeState::Done(r) if r.result.tier == Tier::Semantic));
    }

    struct Stalled;

    #[async_trait]
    impl CompletionBackend for Stalled {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_degrades_reasoning() {
        let cascade = CascadeOrchestrator::builder(LabelCatalog::new(["A"]).unwrap())
            .backend(Arc::new(Stalled))
            .build()
            .unwrap();

        let state = cascade
            .advance(
                CascadeState::ReasoningCheck(Escalation::ModelUnavailable),
                &LogRecord::new("x"),
                Instant::now() + Duration::from_millis(500),
            )
            .await;

        match state {
            CascadeState::Done(resolution) => {
                assert_eq!(resolution.result.label, UNCLASSIFIED);
                assert_eq!(resolution.result.error.as_deref(), Some(BATCH_TIMEOUT_NOTE));
                assert!(!resolution.retain);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[test]
    fn test_builder_rejects_bad_threshold() {
        let result = CascadeOrchestrator::builder(LabelCatalog::new(["A"]).unwrap())
            .threshold(2.0)
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            ClassificationResult::new("A", 1.0, Tier::Pattern),
            ClassificationResult::new("A", 0.9, Tier::Cache),
            ClassificationResult::new(UNCLASSIFIED, 1.0, Tier::Reasoning).with_error("boom"),
        ];
        let summary = BatchSummary::from_results(&results, Duration::from_millis(3));
        assert_eq!(summary.total, 3);
        assert_eq!((summary.pattern, summary.cache, summary.reasoning), (1, 1, 1));
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.elapsed_us, 3000);
    }
}
