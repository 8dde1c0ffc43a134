//! Cascade assembly from configuration

use crate::cascade::CascadeOrchestrator;
use crate::classifier::{CompletionBackend, SemanticClassifier, UnavailableClassifier};
use crate::config::{SemanticConfig, SemanticModelSpec, VigilisConfig};
use crate::openai::{ChatCompletionBackend, DisabledBackend};
use crate::semantic::{CentroidClassifier, CentroidModel, HashEmbedder};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vigilis_core::{Error, LabelCatalog, MetricsRecorder, Result};

/// Load cascade configuration from file
pub fn load_config(path: impl AsRef<Path>) -> Result<VigilisConfig> {
    VigilisConfig::from_file(path.as_ref())
        .map_err(|e| Error::config(format!("Failed to load classifier config: {}", e)))
}

/// Load configuration from `path` and build the cascade
pub fn build_cascade_from_file(
    path: impl AsRef<Path>,
    recorder: Arc<dyn MetricsRecorder>,
) -> Result<CascadeOrchestrator> {
    let config = load_config(path)?;
    build_cascade_from_config(&config, recorder)
}

/// Build a cascade orchestrator from configuration
///
/// Invalid configuration (bad rules, unknown labels, out-of-range values)
/// is an error. A semantic model that cannot be loaded is not: the cascade
/// starts without it and escalates past the semantic tier. Likewise a
/// disabled reasoning tier, or one without an API key, answers
/// `Unclassified` with an error note.
pub fn build_cascade_from_config(
    config: &VigilisConfig,
    recorder: Arc<dyn MetricsRecorder>,
) -> Result<CascadeOrchestrator> {
    let catalog = config.validate()?;

    let semantic = build_semantic(&config.semantic, &catalog)?;
    let backend = build_backend(config)?;

    let cascade = CascadeOrchestrator::builder(catalog)
        .rules(config.rules.clone())
        .semantic(semantic)
        .backend(backend)
        .retry_policy(config.reasoning.retry_policy())
        .recorder(recorder)
        .threshold(config.semantic.threshold)
        .semantic_concurrency(config.semantic.max_concurrency)
        .reasoning_concurrency(config.reasoning.max_concurrency)
        .max_concurrency(config.cascade.max_concurrency)
        .batch_timeout(config.cascade.batch_timeout())
        .cache(config.cache.capacity, config.cache.ttl())
        .cache_errors(config.cache.cache_errors)
        .build()?;

    info!(
        categories = cascade.catalog().categories().len(),
        rules = config.rules.len(),
        threshold = config.semantic.threshold,
        "Cascade initialized"
    );

    Ok(cascade)
}

fn build_semantic(
    config: &SemanticConfig,
    catalog: &LabelCatalog,
) -> Result<Arc<dyn SemanticClassifier>> {
    let model = match &config.model {
        None => {
            warn!("No semantic model configured, semantic tier will always escalate");
            return Ok(Arc::new(UnavailableClassifier::new("no semantic model configured")));
        }
        Some(SemanticModelSpec::File { path }) => match CentroidModel::from_file(path, catalog) {
            Ok(model) => model,
            Err(e @ Error::ModelUnavailable(_)) => {
                warn!(path = %path.display(), "Semantic model unavailable: {}", e);
                return Ok(Arc::new(UnavailableClassifier::new(e.to_string())));
            }
            Err(e) => return Err(e),
        },
        Some(SemanticModelSpec::Training { training }) => {
            CentroidModel::train(HashEmbedder::new(config.dimension)?, training, catalog)?
        }
    };

    info!(classes = model.labels().len(), "Semantic model loaded");
    Ok(Arc::new(CentroidClassifier::new(Arc::new(model), config.sharpness)))
}

fn build_backend(config: &VigilisConfig) -> Result<Arc<dyn CompletionBackend>> {
    let reasoning = &config.reasoning;
    if !reasoning.enabled {
        info!("Reasoning tier disabled");
        return Ok(Arc::new(DisabledBackend::new("reasoning tier disabled")));
    }

    match reasoning.api_key() {
        Some(key) => {
            let backend = ChatCompletionBackend::new(
                &reasoning.base_url,
                reasoning.model.clone(),
                key,
                Duration::from_millis(reasoning.timeout_ms),
            )?;
            info!(endpoint = backend.endpoint(), model = %reasoning.model, "Reasoning backend configured");
            Ok(Arc::new(backend))
        }
        None => {
            warn!(
                env = %reasoning.api_key_env,
                "No API key found, reasoning tier will answer Unclassified"
            );
            Ok(Arc::new(DisabledBackend::new(format!(
                "{} is not set",
                reasoning.api_key_env
            ))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use vigilis_core::{NoopRecorder, Tier, UNCLASSIFIED};

    const CONFIG: &str = r#"
catalog: [Database Error, Service Outage]
rules:
  - pattern: "^database connection"
    label: Database Error
semantic:
  model:
    path: /nonexistent/centroids.json
reasoning:
  enabled: false
"#;

    #[tokio::test]
    async fn test_missing_model_file_degrades() {
        let config = VigilisConfig::from_yaml(CONFIG).unwrap();
        let cascade = build_cascade_from_config(&config, Arc::new(NoopRecorder)).unwrap();

        let matched = cascade.classify_text("Database connection lost").await;
        assert_eq!(matched.tier, Tier::Pattern);

        let other = cascade.classify_text("something odd happened").await;
        assert_eq!(other.label, UNCLASSIFIED);
        assert_eq!(other.tier, Tier::Reasoning);
        assert!(other.has_error());
    }

    #[test]
    fn test_unknown_rule_label_is_error() {
        let mut config = VigilisConfig::from_yaml(CONFIG).unwrap();
        config.rules[0].label = "Not A Label".into();
        let result = build_cascade_from_config(&config, Arc::new(NoopRecorder));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let cascade = build_cascade_from_file(file.path(), Arc::new(NoopRecorder)).unwrap();
        assert_eq!(cascade.catalog().categories().len(), 2);
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/vigilis.yaml"),
            Err(Error::Config(_))
        ));
    }
}
