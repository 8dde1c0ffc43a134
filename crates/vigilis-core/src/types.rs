//! Core types for Vigilis

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single log line as received, plus its normalized form
///
/// Immutable once created; the normalized text is the cache key and the
/// input every tier sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    raw: String,
    normalized: String,
    source: Option<String>,
}

impl LogRecord {
    /// Create a record from raw text
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self {
            raw,
            normalized,
            source: None,
        }
    }

    /// Create a record tagged with the system that emitted it
    pub fn with_source(source: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::new(raw)
        }
    }

    /// Text exactly as received
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Trimmed, case-folded, whitespace-collapsed text
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Emitting system, if known
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

/// Trim, case-fold, and collapse runs of whitespace to a single space
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

/// Which tier of the cascade produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Deterministic rule match
    Pattern,
    /// Embedding similarity model
    Semantic,
    /// Generative-language fallback
    Reasoning,
    /// Served from the result cache
    Cache,
}

impl Tier {
    /// All tiers, in cascade order with the cache last
    pub const ALL: [Tier; 4] = [Tier::Pattern, Tier::Semantic, Tier::Reasoning, Tier::Cache];

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Semantic => "semantic",
            Self::Reasoning => "reasoning",
            Self::Cache => "cache",
        }
    }

    /// Dense index for per-tier counter arrays
    pub fn index(&self) -> usize {
        match self {
            Self::Pattern => 0,
            Self::Semantic => 1,
            Self::Reasoning => 2,
            Self::Cache => 3,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one log record
///
/// Produced exactly once per record by the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Catalog label (or the Unclassified sentinel)
    pub label: String,

    /// Confidence score (0.0-1.0), tier-specific semantics
    pub confidence: f32,

    /// Tier that decided the label
    pub tier: Tier,

    /// Latency in microseconds
    pub latency_us: u64,

    /// Why the result is degraded, if it is
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl ClassificationResult {
    /// Create a new classification result
    pub fn new(label: impl Into<String>, confidence: f32, tier: Tier) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            tier,
            latency_us: 0,
            error: None,
        }
    }

    /// Attach an error note
    pub fn with_error(mut self, note: impl Into<String>) -> Self {
        self.error = Some(note.into());
        self
    }

    /// Set the measured latency
    pub fn with_latency_us(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }

    /// Check if confidence meets a threshold
    pub fn meets_threshold(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// Whether an error note is attached
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_and_folds() {
        assert_eq!(normalize("  Database   CONNECTION\trefused\n"), "database connection refused");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \t\n "), "");
        assert_eq!(normalize("ÀBC déf"), "àbc déf");
    }

    #[test]
    fn test_log_record_keeps_raw() {
        let record = LogRecord::with_source("ModernCRM", "  User User123 logged in. ");
        assert_eq!(record.raw(), "  User User123 logged in. ");
        assert_eq!(record.normalized(), "user user123 logged in.");
        assert_eq!(record.source(), Some("ModernCRM"));
    }

    #[test]
    fn test_result_confidence_clamped() {
        let result = ClassificationResult::new("Error", 1.7, Tier::Semantic);
        assert_eq!(result.confidence, 1.0);
        assert!(result.meets_threshold(0.75));
        assert!(!result.has_error());
    }

    #[test]
    fn test_result_serialization_skips_empty_error() {
        let result = ClassificationResult::new("Error", 1.0, Tier::Pattern);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["tier"], "pattern");
        assert!(json.get("error").is_none());

        let degraded = result.with_error("upstream timed out");
        let json = serde_json::to_value(&degraded).unwrap();
        assert_eq!(json["error"], "upstream timed out");
    }

    mod props {
        use super::super::normalize;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_is_idempotent(text in "[ a-zA-Z0-9.:\\t\\n]{0,64}") {
                let once = normalize(&text);
                prop_assert_eq!(normalize(&once), once.clone());
                prop_assert!(!once.starts_with(' ') && !once.ends_with(' '));
                prop_assert!(!once.contains("  "));
            }
        }
    }
}
