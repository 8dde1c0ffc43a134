//! The closed set of labels every tier must answer from

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Sentinel label for records no tier could place
pub const UNCLASSIFIED: &str = "Unclassified";

/// Ordered set of unique category names plus the Unclassified sentinel
///
/// Lookups are case-insensitive and whitespace-tolerant, but always hand back
/// the canonical spelling from the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct LabelCatalog {
    labels: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl LabelCatalog {
    /// Build a catalog, rejecting blank and duplicate labels
    ///
    /// The sentinel is always present; listing it explicitly is allowed.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self {
            labels: Vec::new(),
            index: HashMap::new(),
        };

        for label in labels {
            let label: String = label.into();
            let trimmed = label.trim();
            if trimmed.is_empty() {
                return Err(Error::config("catalog contains a blank label"));
            }
            if trimmed.eq_ignore_ascii_case(UNCLASSIFIED) {
                continue;
            }
            let key = fold(trimmed);
            if catalog.index.contains_key(&key) {
                return Err(Error::config(format!("duplicate catalog label '{}'", trimmed)));
            }
            catalog.index.insert(key, catalog.labels.len());
            catalog.labels.push(trimmed.to_string());
        }

        if catalog.labels.is_empty() {
            return Err(Error::config("catalog must contain at least one label"));
        }

        catalog
            .index
            .insert(fold(UNCLASSIFIED), catalog.labels.len());
        catalog.labels.push(UNCLASSIFIED.to_string());

        Ok(catalog)
    }

    /// Canonical spelling of `candidate` if it names a catalog member
    pub fn resolve(&self, candidate: &str) -> Option<&str> {
        self.index
            .get(&fold(candidate))
            .map(|&i| self.labels[i].as_str())
    }

    /// Whether `label` is a member (including the sentinel)
    pub fn contains(&self, label: &str) -> bool {
        self.resolve(label).is_some()
    }

    /// Canonical label, or the sentinel when `candidate` is off-catalog
    pub fn coerce(&self, candidate: &str) -> &str {
        self.resolve(candidate).unwrap_or(UNCLASSIFIED)
    }

    /// Real categories in configured order, without the sentinel
    pub fn categories(&self) -> &[String] {
        &self.labels[..self.labels.len() - 1]
    }

    /// All members, sentinel last
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of members including the sentinel
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Never true; the sentinel is always present
    pub fn is_empty(&self) -> bool {
        false
    }
}

fn fold(label: &str) -> String {
    crate::types::normalize(label)
}
