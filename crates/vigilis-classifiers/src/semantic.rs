//! Semantic Tier: hashed embeddings scored against class centroids
//!
//! The model is loaded once at startup into a [`CentroidModel`] and shared
//! read-only behind an `Arc`. Nothing here mutates per request. Inference
//! runs on the blocking pool, so the cascade's semantic permits bound how
//! many predictions execute in parallel.
//!
//! Embeddings are FNV-1a hashed bag-of-words vectors, L2-normalised. Each
//! class is represented by the normalised mean of its training embeddings.
//! Confidence is the softmax probability of the best class over cosine
//! similarities scaled by a sharpness factor, so it is monotone in
//! similarity and always in [0, 1].

use crate::classifier::{SemanticClassifier, SemanticPrediction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use vigilis_core::{Error, LabelCatalog, Result, UNCLASSIFIED};

/// FNV-1a offset basis (64-bit).
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;

/// FNV-1a prime (64-bit).
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// Tokens shorter than this carry no signal.
const MIN_TOKEN_LEN: usize = 2;

/// Default embedding dimension
pub const DEFAULT_DIMENSION: usize = 384;

/// Deterministic hashed bag-of-words embedder
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder; `dimension` must be non-zero
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::config("embedding dimension must be > 0"));
        }
        Ok(Self { dimension })
    }

    /// Output vector length
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed text into a unit-length vector (all zeros for empty input)
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; self.dimension];

        for token in tokenize(text) {
            let hash = fnv1a_hash(token.as_bytes());
            let index = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 1 { 1.0 } else { -1.0 };
            embedding[index] += sign;
        }

        l2_normalize(&mut embedding);
        embedding
    }
}

/// On-disk model format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidFile {
    /// Embedding dimension the centroids were built with
    pub dimension: usize,

    /// One centroid per class
    pub classes: Vec<CentroidEntry>,
}

/// A single class representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidEntry {
    /// Catalog label
    pub label: String,

    /// Class prototype vector
    pub centroid: Vec<f32>,
}

/// Immutable trained model state
#[derive(Debug, Clone)]
pub struct CentroidModel {
    embedder: HashEmbedder,
    labels: Vec<String>,
    centroids: Vec<Vec<f32>>,
}

impl CentroidModel {
    /// Train centroids from labelled example texts
    pub fn train(
        embedder: HashEmbedder,
        examples: &BTreeMap<String, Vec<String>>,
        catalog: &LabelCatalog,
    ) -> Result<Self> {
        let mut labels = Vec::with_capacity(examples.len());
        let mut centroids = Vec::with_capacity(examples.len());

        for (label, texts) in examples {
            let label = canonical_label(label, catalog)?;
            if texts.is_empty() {
                return Err(Error::config(format!(
                    "no training examples for semantic class '{}'",
                    label
                )));
            }

            let mut centroid = vec![0.0_f32; embedder.dimension()];
            for text in texts {
                let embedding = embedder.embed(&vigilis_core::normalize(text));
                for (c, e) in centroid.iter_mut().zip(&embedding) {
                    *c += e;
                }
            }
            l2_normalize(&mut centroid);

            labels.push(label);
            centroids.push(centroid);
        }

        Self::from_parts(embedder, labels, centroids)
    }

    /// Load centroids from a JSON model file
    pub fn from_file(path: impl AsRef<Path>, catalog: &LabelCatalog) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::model_unavailable(format!("cannot read model {}: {}", path.display(), e))
        })?;
        let file: CentroidFile = serde_json::from_str(&content).map_err(|e| {
            Error::model_unavailable(format!("cannot parse model {}: {}", path.display(), e))
        })?;
        Self::from_centroid_file(file, catalog)
    }

    /// Build from an already-parsed model file
    pub fn from_centroid_file(file: CentroidFile, catalog: &LabelCatalog) -> Result<Self> {
        let embedder = HashEmbedder::new(file.dimension)?;
        let mut labels = Vec::with_capacity(file.classes.len());
        let mut centroids = Vec::with_capacity(file.classes.len());

        for entry in file.classes {
            if entry.centroid.len() != file.dimension {
                return Err(Error::model_unavailable(format!(
                    "centroid for '{}' has {} dimensions, expected {}",
                    entry.label,
                    entry.centroid.len(),
                    file.dimension
                )));
            }
            let mut centroid = entry.centroid;
            l2_normalize(&mut centroid);
            labels.push(canonical_label(&entry.label, catalog)?);
            centroids.push(centroid);
        }

        Self::from_parts(embedder, labels, centroids)
    }

    fn from_parts(embedder: HashEmbedder, labels: Vec<String>, centroids: Vec<Vec<f32>>) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::model_unavailable("semantic model has no classes"));
        }
        Ok(Self {
            embedder,
            labels,
            centroids,
        })
    }

    /// Export as a model file
    pub fn to_centroid_file(&self) -> CentroidFile {
        CentroidFile {
            dimension: self.embedder.dimension(),
            classes: self
                .labels
                .iter()
                .zip(&self.centroids)
                .map(|(label, centroid)| CentroidEntry {
                    label: label.clone(),
                    centroid: centroid.clone(),
                })
                .collect(),
        }
    }

    /// Class labels in model order
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Cosine similarity of `text` against every centroid
    pub fn similarities(&self, text: &str) -> Vec<f32> {
        let embedding = self.embedder.embed(text);
        self.centroids
            .iter()
            .map(|centroid| dot(&embedding, centroid))
            .collect()
    }

    /// Score `text`, best class first
    pub fn predict(&self, text: &str, sharpness: f32) -> SemanticPrediction {
        let sims = self.similarities(text);
        let probs = softmax(&sims, sharpness);

        let mut scored: Vec<(String, f32)> = self
            .labels
            .iter()
            .cloned()
            .zip(probs)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let (label, confidence) = scored[0].clone();
        SemanticPrediction {
            label,
            confidence: confidence.clamp(0.0, 1.0),
            all_scores: Some(scored),
        }
    }
}

/// Semantic classifier backed by a shared [`CentroidModel`]
pub struct CentroidClassifier {
    name: String,
    model: Arc<CentroidModel>,
    sharpness: f32,
}

impl CentroidClassifier {
    /// Create a classifier over a loaded model
    pub fn new(model: Arc<CentroidModel>, sharpness: f32) -> Self {
        Self {
            name: "centroid".to_string(),
            model,
            sharpness,
        }
    }

    /// Shared model state
    pub fn model(&self) -> &Arc<CentroidModel> {
        &self.model
    }
}

#[async_trait]
impl SemanticClassifier for CentroidClassifier {
    async fn classify(&self, text: &str) -> Result<SemanticPrediction> {
        // CPU-bound; keep it off the async workers
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let sharpness = self.sharpness;
        tokio::task::spawn_blocking(move || model.predict(&text, sharpness))
            .await
            .map_err(|e| Error::internal(format!("semantic inference task failed: {}", e)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn canonical_label(label: &str, catalog: &LabelCatalog) -> Result<String> {
    match catalog.resolve(label) {
        Some(canonical) if canonical != UNCLASSIFIED => Ok(canonical.to_string()),
        _ => Err(Error::config(format!(
            "semantic class '{}' is not a catalog category",
            label
        ))),
    }
}

fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn softmax(scores: &[f32], sharpness: f32) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores
        .iter()
        .map(|s| ((s - max) * sharpness).exp())
        .collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> LabelCatalog {
        LabelCatalog::new(["Database Error", "Resource Usage", "Security Alert"]).unwrap()
    }

    fn training() -> BTreeMap<String, Vec<String>> {
        let mut examples = BTreeMap::new();
        examples.insert(
            "Database Error".to_string(),
            vec![
                "database connection refused".to_string(),
                "connection to db pool timed out".to_string(),
                "sql query failed deadlock detected".to_string(),
            ],
        );
        examples.insert(
            "Resource Usage".to_string(),
            vec![
                "high memory consumption observed".to_string(),
                "cpu utilization spiked above threshold".to_string(),
                "disk space running low on node".to_string(),
            ],
        );
        examples.insert(
            "Security Alert".to_string(),
            vec![
                "unauthorized access detected".to_string(),
                "multiple authentication failures for user".to_string(),
            ],
        );
        examples
    }

    #[test]
    fn test_embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64).unwrap();
        let a = embedder.embed("disk space running low");
        let b = embedder.embed("disk space running low");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);

        assert!(embedder.embed("").iter().all(|x| *x == 0.0));
        assert!(HashEmbedder::new(0).is_err());
    }

    #[test]
    fn test_nearest_centroid_prediction() {
        let model = CentroidModel::train(HashEmbedder::new(256).unwrap(), &training(), &catalog()).unwrap();
        let prediction = model.predict("cpu utilization spiked during batch job", 10.0);
        assert_eq!(prediction.label, "Resource Usage");

        let scores = prediction.all_scores.unwrap();
        assert_eq!(scores.len(), 3);
        let total: f32 = scores.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(scores.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_confidence_is_monotone_in_similarity() {
        let model = CentroidModel::train(HashEmbedder::new(256).unwrap(), &training(), &catalog()).unwrap();
        let close = model.predict("unauthorized access detected", 10.0);
        let vague = model.predict("hello from worker process", 10.0);
        assert_eq!(close.label, "Security Alert");
        assert!(close.confidence > vague.confidence);
    }

    #[test]
    fn test_sharpness_controls_peakedness() {
        let model = CentroidModel::train(HashEmbedder::new(256).unwrap(), &training(), &catalog()).unwrap();
        let soft = model.predict("database connection refused", 1.0);
        let sharp = model.predict("database connection refused", 20.0);
        assert_eq!(soft.label, sharp.label);
        assert!(sharp.confidence > soft.confidence);
    }

    #[test]
    fn test_training_rejects_unknown_label() {
        let mut examples = training();
        examples.insert("Network Error".to_string(), vec!["socket closed".to_string()]);
        let err = CentroidModel::train(HashEmbedder::new(32).unwrap(), &examples, &catalog()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_model_file_round_trip() {
        let model = CentroidModel::train(HashEmbedder::new(128).unwrap(), &training(), &catalog()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("centroids.json");
        std::fs::write(&path, serde_json::to_string(&model.to_centroid_file()).unwrap()).unwrap();

        let loaded = CentroidModel::from_file(&path, &catalog()).unwrap();
        assert_eq!(loaded.labels(), model.labels());
        let text = "sql query failed";
        assert_eq!(loaded.predict(text, 10.0).label, model.predict(text, 10.0).label);
    }

    #[test]
    fn test_missing_model_file_is_unavailable() {
        let err = CentroidModel::from_file("/nonexistent/centroids.json", &catalog()).unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(_)));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let file = CentroidFile {
            dimension: 4,
            classes: vec![CentroidEntry {
                label: "Database Error".into(),
                centroid: vec![1.0, 0.0],
            }],
        };
        assert!(CentroidModel::from_centroid_file(file, &catalog()).is_err());
    }

    #[tokio::test]
    async fn test_classifier_shares_model() {
        let model = Arc::new(CentroidModel::train(HashEmbedder::new(128).unwrap(), &training(), &catalog()).unwrap());
        let classifier = CentroidClassifier::new(Arc::clone(&model), 10.0);
        let prediction = classifier.classify("database connection refused").await.unwrap();
        assert_eq!(prediction.label, "Database Error");
        assert_eq!(Arc::strong_count(&model), 2);
        assert_eq!(prediction.label, model.predict("database connection refused", 10.0).label);
    }
}
