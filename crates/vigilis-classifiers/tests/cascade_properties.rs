//! Properties that must hold for any input and any tier behaviour


use mock_tiers::{BrokenSemantic, MockBackend, MockSemantic};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use vigilis_classifiers::{CascadeOrchestrator, RetryPolicy, RuleEntry, SemanticClassifier};
use vigilis_core::{Error, LabelCatalog, Tier};

const CATEGORIES: [&str; 3] = ["Database Error", "Service Outage", "Security Alert"];

fn catalog() -> LabelCatalog {
    LabelCatalog::new(CATEGORIES).unwrap()
}

fn no_retries() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(1),
        max_retries: 0,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn label_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::sample::select(CATEGORIES.to_vec()).prop_map(str::to_string),
        Just("unclassified".to_string()),
        "\\PC{0,30}",
    ]
}

fn answer_strategy() -> impl Strategy<Value = Result<String, Error>> {
    prop_oneof![
        label_strategy().prop_map(Ok),
        label_strategy().prop_map(|label| Ok(format!(r#"{{"label": "{}"}}"#, label))),
        any::<bool>().prop_map(|timed_out| if timed_out {
            Err(Error::UpstreamTimeout)
        } else {
            Err(Error::UpstreamAuth("denied".into()))
        }),
    ]
}

fn semantic_strategy() -> impl Strategy<Value = Option<(String, f32)>> {
    prop::option::of((label_strategy(), 0.0f32..=1.0f32))
}

fn build(
    rules: Vec<RuleEntry>,
    semantic: Option<(String, f32)>,
    answer: Result<String, Error>,
) -> (CascadeOrchestrator, Arc<MockBackend>) {
    let semantic: Arc<dyn SemanticClassifier> = match semantic {
        Some((label, confidence)) => Arc::new(MockSemantic::new(&label, confidence)),
        None => Arc::new(BrokenSemantic::new()),
    };
    let backend = Arc::new(MockBackend::scripted(vec![answer]));
    let cascade = CascadeOrchestrator::builder(catalog())
        .rules(rules)
        .semantic(semantic)
        .backend(Arc::clone(&backend) as _)
        .retry_policy(no_retries())
        .build()
        .unwrap();
    (cascade, backend)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn labels_never_leave_the_catalog(
        text in "\\PC{0,80}",
        semantic in semantic_strategy(),
        answer in answer_strategy(),
    ) {
        let (cascade, _backend) = build(Vec::new(), semantic, answer);
        let result = runtime().block_on(cascade.classify_text(&text));

        prop_assert!(catalog().contains(&result.label), "{:?} escaped the catalog", result.label);
        prop_assert!((0.0..=1.0).contains(&result.confidence));
    }

    #[test]
    fn rule_match_wins_whatever_the_other_tiers_say(
        prefix in "[a-zA-Z0-9 .:/_-]{0,40}",
        suffix in "[a-zA-Z0-9 .:/_-]{0,40}",
        semantic in semantic_strategy(),
        answer in answer_strategy(),
    ) {
        let rules = vec![RuleEntry::keywords(["failed login"], "Security Alert", 10)];
        let (cascade, backend) = build(rules, semantic, answer);
        let text = format!("{} Failed Login {}", prefix, suffix);
        let result = runtime().block_on(cascade.classify_text(&text));

        prop_assert_eq!(result.tier, Tier::Pattern);
        prop_assert_eq!(result.label.as_str(), "Security Alert");
        prop_assert_eq!(backend.call_count(), 0);
    }
}
