//! Vigilis Classifiers
//!
//! Tiered log-line classification, cheapest tier first:
//! - Pattern (microseconds): ordered regex and keyword rules
//! - Semantic (sub-millisecond): nearest-centroid over hashed embeddings
//! - Reasoning (seconds): a generative completion service, retried and
//!   validated against the label catalog
//!
//! The [`CascadeOrchestrator`] sits in front of all three with a
//! single-flight result cache and bounded parallelism for batches.

pub mod cache;
pub mod cascade;
pub mod classifier;
pub mod config;
pub mod openai;
pub mod patterns;
pub mod reasoning;
pub mod registry;
pub mod semantic;

pub use cache::{CacheOrigin, CacheOutcome, CacheStats, Computed, ResultCache};
pub use cascade::{
    BatchOutcome, BatchSummary, CascadeBuilder, CascadeOrchestrator, CascadeSettings, CascadeState,
    Escalation, Resolution,
};
pub use classifier::{CompletionBackend, SemanticClassifier, SemanticPrediction, UnavailableClassifier};
pub use config::{
    CacheConfig, CascadeConfig, ReasoningConfig, SemanticConfig, SemanticModelSpec, VigilisConfig,
};
pub use openai::{ChatCompletionBackend, DisabledBackend};
pub use patterns::{PatternMatch, PatternTier, RuleEntry};
pub use reasoning::{ReasoningOutcome, ReasoningTier, RetryPolicy};
pub use registry::{build_cascade_from_config, build_cascade_from_file, load_config};
pub use semantic::{CentroidClassifier, CentroidModel, HashEmbedder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cascade::{BatchOutcome, CascadeOrchestrator};
    pub use crate::classifier::{CompletionBackend, SemanticClassifier, SemanticPrediction};
    pub use crate::config::VigilisConfig;
    pub use crate::patterns::RuleEntry;
    pub use crate::registry::build_cascade_from_config;
    pub use vigilis_core::prelude::*;
}
