//! Tier contracts and common types

use async_trait::async_trait;
use vigilis_core::Result;

/// Embedding-similarity classifier (Semantic Tier)
///
/// Implementations must report `Error::ModelUnavailable` rather than guess
/// when their model state is missing; the cascade escalates on that.
#[async_trait]
pub trait SemanticClassifier: Send + Sync {
    /// Classify normalized text
    async fn classify(&self, text: &str) -> Result<SemanticPrediction>;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Raw request/response access to a generative-text service
///
/// The answer is untrusted arbitrary text; parsing and catalog validation
/// happen in the reasoning tier, not here.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Send a prompt, return the model's text answer
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get the backend name
    fn name(&self) -> &str;
}

/// Best label from the semantic tier with its confidence
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticPrediction {
    /// Predicted label
    pub label: String,

    /// Confidence score (0.0-1.0), higher means stronger belief
    pub confidence: f32,

    /// Scores for every class, best first (when the model exposes them)
    pub all_scores: Option<Vec<(String, f32)>>,
}

impl SemanticPrediction {
    /// Create a new prediction
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            all_scores: None,
        }
    }

    /// Check if confidence meets the acceptance threshold
    pub fn accepted_at(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// Semantic classifier standing in for a model that failed to load
pub struct UnavailableClassifier {
    reason: String,
}

impl UnavailableClassifier {
    /// Create a classifier that always reports why the model is missing
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl SemanticClassifier for UnavailableClassifier {
    async fn classify(&self, _text: &str) -> Result<SemanticPrediction> {
        Err(vigilis_core::Error::model_unavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
