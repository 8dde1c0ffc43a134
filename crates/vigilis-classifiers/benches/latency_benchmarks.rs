//! Latency benchmarks for the cascade tiers
//!
//! - Pattern tier: microseconds per line
//! - Semantic tier: sub-millisecond per line
//! - Cached lookups: must stay near the cost of a map lookup
//!
//! Run with: cargo bench -p vigilis-classifiers

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

use vigilis_classifiers::{
    CascadeOrchestrator, CentroidClassifier, CentroidModel, HashEmbedder, PatternTier, RuleEntry,
    SemanticClassifier,
};
use vigilis_core::{normalize, LabelCatalog};

const LINES: [(&str, &str); 4] = [
    ("rule_hit", "Database connection refused at 10.0.0.5"),
    ("keyword_hit", "User admin failed login from 192.168.1.20"),
    ("no_match_short", "Disk usage at 91 percent"),
    (
        "no_match_long",
        "Request 7f3a completed with status 200 after 1532ms on worker-12, upstream pool saturated, retry budget remaining 3",
    ),
];

fn catalog() -> LabelCatalog {
    LabelCatalog::new([
        "Database Error",
        "Security Alert",
        "Resource Usage",
        "Service Outage",
        "User Action",
    ])
    .unwrap()
}

fn rules() -> Vec<RuleEntry> {
    vec![
        RuleEntry::regex("^database connection", "Database Error", 10),
        RuleEntry::keywords(["failed login", "unauthorized"], "Security Alert", 20),
        RuleEntry::regex(r"user \w+ logged (in|out)", "User Action", 30),
        RuleEntry::regex(r"backup (started|completed)", "System Notification", 40),
    ]
}

fn training() -> BTreeMap<String, Vec<String>> {
    let mut examples = BTreeMap::new();
    examples.insert(
        "Resource Usage".to_string(),
        vec!["disk usage high".to_string(), "memory pressure on node".to_string()],
    );
    examples.insert(
        "Service Outage".to_string(),
        vec!["upstream unavailable".to_string(), "service returned 503".to_string()],
    );
    examples
}

/// Benchmark rule evaluation
fn benchmark_pattern_tier(c: &mut Criterion) {
    let catalog = LabelCatalog::new([
        "Database Error",
        "Security Alert",
        "User Action",
        "System Notification",
    ])
    .unwrap();
    let tier = PatternTier::new(rules(), &catalog).unwrap();

    let mut group = c.benchmark_group("Pattern_Tier");
    for (name, line) in LINES {
        let normalized = normalize(line);
        group.bench_with_input(BenchmarkId::new("matches", name), &normalized, |b, text| {
            b.iter(|| tier.matches(black_box(text)));
        });
    }
    group.finish();
}

/// Benchmark nearest-centroid scoring
fn benchmark_semantic_tier(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let model = CentroidModel::train(HashEmbedder::new(384).unwrap(), &training(), &catalog()).unwrap();
    let classifier = CentroidClassifier::new(Arc::new(model), 10.0);

    let mut group = c.benchmark_group("Semantic_Tier");
    for (name, line) in LINES {
        let normalized = normalize(line);
        group.bench_with_input(BenchmarkId::new("classify", name), &normalized, |b, text| {
            b.iter(|| rt.block_on(async { classifier.classify(black_box(text)).await.unwrap() }));
        });
    }
    group.finish();
}

/// Benchmark warm cache lookups through the full cascade
fn benchmark_cached_cascade(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cascade = CascadeOrchestrator::builder(catalog())
        .rules(vec![RuleEntry::regex("^database connection", "Database Error", 10)])
        .build()
        .unwrap();

    rt.block_on(cascade.classify_text(LINES[0].1));

    c.bench_function("Cascade_cache_hit", |b| {
        b.iter(|| rt.block_on(cascade.classify_text(black_box(LINES[0].1))));
    });
}

criterion_group!(
    benches,
    benchmark_pattern_tier,
    benchmark_semantic_tier,
    benchmark_cached_cascade
);
criterion_main!(benches);
