//! Vigilis Core
//!
//! Core types, traits, and utilities shared across Vigilis components.
//!
//! This crate provides:
//! - Log records and their normalized form
//! - The closed label catalog every tier's output is validated against
//! - Classification results and the tier that produced them
//! - Error types and result handling
//! - The metrics recording seam the cascade reports through

pub mod catalog;
pub mod error;
pub mod recorder;
pub mod types;

pub use catalog::{LabelCatalog, UNCLASSIFIED};
pub use error::{Error, Result};
pub use recorder::{MetricsRecorder, NoopRecorder};
pub use types::{normalize, ClassificationResult, LogRecord, Tier};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::catalog::{LabelCatalog, UNCLASSIFIED};
    pub use crate::error::{Error, Result};
    pub use crate::recorder::MetricsRecorder;
    pub use crate::types::{ClassificationResult, LogRecord, Tier};
}
