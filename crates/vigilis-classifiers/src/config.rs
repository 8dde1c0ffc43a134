//! Configuration for the classification cascade
//!
//! Loaded once at process start from YAML; nothing here is re-read
//! mid-batch.

use crate::patterns::RuleEntry;
use crate::reasoning::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigilis_core::{Error, LabelCatalog, Result};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilisConfig {
    /// Ordered category names; "Unclassified" is implicit
    pub catalog: Vec<String>,

    /// Pattern tier rules
    #[serde(default)]
    pub rules: Vec<RuleEntry>,

    /// Semantic tier settings
    #[serde(default)]
    pub semantic: SemanticConfig,

    /// Reasoning tier settings
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Batch orchestration settings
    #[serde(default)]
    pub cascade: CascadeConfig,
}

/// Semantic tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Minimum confidence to accept without escalation
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Concurrent inferences allowed
    #[serde(default = "default_semantic_concurrency")]
    pub max_concurrency: usize,

    /// Embedding dimension used when training from examples
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Softmax scale applied to cosine similarities
    #[serde(default = "default_sharpness")]
    pub sharpness: f32,

    /// Where the class representations come from
    #[serde(default)]
    pub model: Option<SemanticModelSpec>,
}

/// Semantic model source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SemanticModelSpec {
    /// Pre-computed centroids on disk
    File {
        path: PathBuf,
    },

    /// Labelled example texts to train centroids from at startup
    Training {
        training: BTreeMap<String, Vec<String>>,
    },
}

/// Reasoning tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    /// Whether to call the generative service at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt on transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Retry delay cap in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Concurrent upstream calls allowed
    #[serde(default = "default_reasoning_concurrency")]
    pub max_concurrency: usize,
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of stored results
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Optional expiry in seconds
    #[serde(default)]
    pub ttl_secs: Option<u64>,

    /// Keep results that carry an error note
    #[serde(default)]
    pub cache_errors: bool,
}

/// Batch orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Records in flight per batch
    #[serde(default = "default_cascade_concurrency")]
    pub max_concurrency: usize,

    /// Deadline for a whole batch in milliseconds
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

impl VigilisConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid configuration: {}", e)))
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read configuration {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Build the label catalog
    pub fn label_catalog(&self) -> Result<LabelCatalog> {
        LabelCatalog::new(self.catalog.iter().cloned())
    }

    /// Check everything that can be checked without loading models
    ///
    /// Rule labels and patterns are validated when the pattern tier is
    /// compiled from the same catalog.
    pub fn validate(&self) -> Result<LabelCatalog> {
        let catalog = self.label_catalog()?;

        if !(0.0..=1.0).contains(&self.semantic.threshold) {
            return Err(Error::config(format!(
                "semantic.threshold must be within [0, 1], got {}",
                self.semantic.threshold
            )));
        }
        if !(self.semantic.sharpness > 0.0 && self.semantic.sharpness.is_finite()) {
            return Err(Error::config("semantic.sharpness must be a positive number"));
        }
        if self.semantic.dimension == 0 {
            return Err(Error::config("semantic.dimension must be > 0"));
        }

        for (name, value) in [
            ("semantic.max_concurrency", self.semantic.max_concurrency),
            ("reasoning.max_concurrency", self.reasoning.max_concurrency),
            ("cascade.max_concurrency", self.cascade.max_concurrency),
            ("cache.capacity", self.cache.capacity),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{} must be > 0", name)));
            }
        }

        if self.reasoning.timeout_ms == 0 || self.cascade.batch_timeout_ms == 0 {
            return Err(Error::config("timeouts must be > 0"));
        }

        Ok(catalog)
    }
}

impl ReasoningConfig {
    /// Retry schedule derived from this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// API key from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl CacheConfig {
    /// Expiry as a duration
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl CascadeConfig {
    /// Batch deadline as a duration
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            max_concurrency: default_semantic_concurrency(),
            dimension: default_dimension(),
            sharpness: default_sharpness(),
            model: None,
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_concurrency: default_reasoning_concurrency(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: None,
            cache_errors: false,
        }
    }
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_cascade_concurrency(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

fn default_threshold() -> f32 {
    0.75
}

fn default_semantic_concurrency() -> usize {
    num_cpus::get().max(1)
}

fn default_dimension() -> usize {
    crate::semantic::DEFAULT_DIMENSION
}

fn default_sharpness() -> f32 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "VIGILIS_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_reasoning_concurrency() -> usize {
    4
}

fn default_cache_capacity() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

fn default_cascade_concurrency() -> usize {
    64
}

fn default_batch_timeout_ms() -> u64 {
    60_000
}
