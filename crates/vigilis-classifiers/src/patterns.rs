//! Rule-based Pattern Tier
//!
//! Rules are checked in ascending priority order and the first structural
//! match wins. There is no scoring: a match is authoritative.

use aho_corasick::AhoCorasick;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use vigilis_core::{Error, LabelCatalog, Result};

/// One configured rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Regex matched case-insensitively against normalized text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Literal keywords, any of which triggers the rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<String>>,

    /// Target catalog label
    pub label: String,

    /// Lower is checked first
    #[serde(default)]
    pub priority: u32,
}

impl RuleEntry {
    /// Regex rule
    pub fn regex(pattern: impl Into<String>, label: impl Into<String>, priority: u32) -> Self {
        Self {
            pattern: Some(pattern.into()),
            any_of: None,
            label: label.into(),
            priority,
        }
    }

    /// Keyword rule
    pub fn keywords<I, S>(keywords: I, label: impl Into<String>, priority: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: None,
            any_of: Some(keywords.into_iter().map(Into::into).collect()),
            label: label.into(),
            priority,
        }
    }
}

/// Outcome of a successful rule match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    /// Canonical catalog label
    pub label: String,

    /// Priority of the rule that matched
    pub priority: u32,

    /// Position of the rule in evaluation order
    pub rule_index: usize,
}

enum Matcher {
    Regex(Regex),
    Keywords(AhoCorasick),
}

impl Matcher {
    fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(text),
            Self::Keywords(ac) => ac.is_match(text),
        }
    }
}

struct CompiledRule {
    matcher: Matcher,
    label: String,
    priority: u32,
}

/// Ordered, read-only rule set
pub struct PatternTier {
    rules: Vec<CompiledRule>,
}

impl PatternTier {
    /// Compile and validate rules against the catalog
    ///
    /// Any malformed rule rejects the whole set with a configuration error.
    pub fn new(rules: Vec<RuleEntry>, catalog: &LabelCatalog) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());

        for (position, rule) in rules.into_iter().enumerate() {
            let label = catalog.resolve(&rule.label).ok_or_else(|| {
                Error::config(format!(
                    "rule #{} targets label '{}' which is not in the catalog",
                    position, rule.label
                ))
            })?;

            let matcher = match (&rule.pattern, &rule.any_of) {
                (Some(pattern), None) => {
                    let re = RegexBuilder::new(pattern)
                        .case_insensitive(true)
                        .build()
                        .map_err(|e| {
                            Error::config(format!("rule #{} has invalid pattern: {}", position, e))
                        })?;
                    Matcher::Regex(re)
                }
                (None, Some(keywords)) => {
                    if keywords.iter().all(|k| k.trim().is_empty()) {
                        return Err(Error::config(format!(
                            "rule #{} has no usable keywords",
                            position
                        )));
                    }
                    let keywords: Vec<&str> = keywords
                        .iter()
                        .map(|k| k.trim())
                        .filter(|k| !k.is_empty())
                        .collect();
                    let ac = AhoCorasick::builder()
                        .ascii_case_insensitive(true)
                        .build(&keywords)
                        .map_err(|e| {
                            Error::config(format!(
                                "rule #{} failed to build keyword matcher: {}",
                                position, e
                            ))
                        })?;
                    Matcher::Keywords(ac)
                }
                _ => {
                    return Err(Error::config(format!(
                        "rule #{} must set exactly one of 'pattern' or 'any_of'",
                        position
                    )))
                }
            };

            compiled.push(CompiledRule {
                matcher,
                label: label.to_string(),
                priority: rule.priority,
            });
        }

        // Stable: equal priorities keep configuration order
        compiled.sort_by_key(|r| r.priority);

        Ok(Self { rules: compiled })
    }

    /// First matching rule in priority order, if any
    pub fn matches(&self, normalized_text: &str) -> Option<PatternMatch> {
        self.rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.matcher.is_match(normalized_text))
            .map(|(rule_index, rule)| PatternMatch {
                label: rule.label.clone(),
                priority: rule.priority,
                rule_index,
            })
    }

    /// Number of loaded rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are loaded
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
