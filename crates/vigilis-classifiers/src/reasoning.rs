//! Reasoning Tier: constrained generative classification
//!
//! Sends the text and the closed catalog to a [`CompletionBackend`], parses
//! the answer, and validates it against the catalog. Transient failures are
//! retried with exponential backoff; anything that still fails becomes
//! `Unclassified` with an error note. This tier never returns an error.

use crate::classifier::CompletionBackend;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use vigilis_core::{Error, LabelCatalog, MetricsRecorder, Result, Tier, UNCLASSIFIED};

/// Fixed confidence for reasoning answers; the service offers no probability
pub const REASONING_CONFIDENCE: f32 = 1.0;

/// Longest raw answer echoed into logs and error notes
const MAX_ECHO_CHARS: usize = 120;

/// Bounded retry schedule for upstream calls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub timeout: Duration,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// What the reasoning tier decided for one record
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningOutcome {
    /// Catalog label, `Unclassified` on any failure
    pub label: String,

    /// Why the label is degraded, if it is
    pub error: Option<String>,

    /// Upstream calls made, including the first
    pub attempts: u32,
}

/// Reasoning tier over an untrusted completion backend
pub struct ReasoningTier {
    backend: Arc<dyn CompletionBackend>,
    catalog: Arc<LabelCatalog>,
    policy: RetryPolicy,
    recorder: Arc<dyn MetricsRecorder>,
}

impl ReasoningTier {
    /// Create a new reasoning tier
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        catalog: Arc<LabelCatalog>,
        policy: RetryPolicy,
        recorder: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            backend,
            catalog,
            policy,
            recorder,
        }
    }

    /// Backend name
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Retry schedule in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Classify normalized text; always yields a catalog label
    pub async fn classify(&self, text: &str) -> ReasoningOutcome {
        let prompt = build_prompt(text, &self.catalog);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.attempt(&prompt).await {
                Ok(answer) => {
                    return match self.catalog.resolve(&answer) {
                        Some(label) => ReasoningOutcome {
                            label: label.to_string(),
                            error: None,
                            attempts,
                        },
                        None => {
                            let echoed = truncate(&answer);
                            warn!(answer = %echoed, "Reasoning answer is outside the catalog");
                            self.recorder.record_off_catalog(&answer);
                            ReasoningOutcome {
                                label: UNCLASSIFIED.to_string(),
                                error: Some(format!("off-catalog answer '{}'", echoed)),
                                attempts,
                            }
                        }
                    };
                }
                Err(e) => {
                    self.recorder.record_tier_error(Tier::Reasoning, e.kind());

                    let retries_used = attempts - 1;
                    if e.is_transient() && retries_used < self.policy.max_retries {
                        let delay = self.policy.backoff(retries_used);
                        warn!(
                            backend = self.backend.name(),
                            attempt = attempts,
                            delay_ms = delay.as_millis() as u64,
                            "Reasoning call failed, retrying: {}",
                            e
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    warn!(
                        backend = self.backend.name(),
                        attempts,
                        "Reasoning tier gave up: {}",
                        e
                    );
                    return ReasoningOutcome {
                        label: UNCLASSIFIED.to_string(),
                        error: Some(format!("reasoning failed after {} attempt(s): {}", attempts, e)),
                        attempts,
                    };
                }
            }
        }
    }

    /// One bounded call plus parse
    async fn attempt(&self, prompt: &str) -> Result<String> {
        let raw = tokio::time::timeout(self.policy.timeout, self.backend.complete(prompt))
            .await
            .map_err(|_| Error::UpstreamTimeout)??;
        debug!(backend = self.backend.name(), "Reasoning backend answered");
        parse_label(&raw)
    }
}

/// Build the constrained instruction for one log line
pub fn build_prompt(text: &str, catalog: &LabelCatalog) -> String {
    let mut prompt = String::from(
        "You classify operational log lines.\n\
         Choose exactly one category from this list, or \"Unclassified\" if none fits:\n",
    );
    for label in catalog.labels() {
        prompt.push_str("- ");
        prompt.push_str(label);
        prompt.push('\n');
    }
    prompt.push_str("\nLog line:\n");
    prompt.push_str(text);
    prompt.push_str(
        "\n\nRespond with only a JSON object of the form {\"label\": \"<category>\"}. \
         Do not invent new categories.",
    );
    prompt
}

#[derive(Deserialize)]
struct LabelAnswer {
    label: String,
}

/// Extract the label text from a raw answer
///
/// Accepts `{"label": "..."}` (optionally inside a code fence or surrounded
/// by chatter) or a single bare line. Whether the label is in the catalog is
/// not decided here.
pub fn parse_label(raw: &str) -> Result<String> {
    let body = strip_code_fence(raw.trim());
    if body.is_empty() {
        return Err(Error::malformed("empty answer"));
    }

    if let Some(json) = find_json_object(body) {
        return match serde_json::from_str::<LabelAnswer>(json) {
            Ok(answer) if !answer.label.trim().is_empty() => Ok(answer.label.trim().to_string()),
            Ok(_) => Err(Error::malformed("answer has an empty label")),
            Err(e) => Err(Error::malformed(format!("unparseable JSON answer: {}", e))),
        };
    }

    let mut lines = body.lines().map(str::trim).filter(|l| !l.is_empty());
    match (lines.next(), lines.next()) {
        (Some(line), None) if line.contains(['{', '}']) => Err(Error::malformed(format!(
            "unterminated JSON answer '{}'",
            truncate(line)
        ))),
        (Some(line), None) => {
            let label = line
                .trim_start_matches("label:")
                .trim_start_matches("Label:")
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '.' || c == '`')
                .trim();
            if label.is_empty() {
                Err(Error::malformed("answer has an empty label"))
            } else {
                Ok(label.to_string())
            }
        }
        _ => Err(Error::malformed(format!(
            "expected a single label, got '{}'",
            truncate(body)
        ))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

fn find_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_ECHO_CHARS {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(MAX_ECHO_CHARS).collect();
        out.push('…');
        out
    }
}
