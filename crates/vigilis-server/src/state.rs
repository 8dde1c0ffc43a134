//! Shared application state

use crate::config::ServerConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::info;
use vigilis_classifiers::{build_cascade_from_file, CascadeOrchestrator};
use vigilis_telemetry::MetricsCollector;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// The classification cascade, loaded once at startup
    pub cascade: Arc<CascadeOrchestrator>,

    /// In-process metric totals
    pub metrics: MetricsCollector,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Load the cascade named by `config` and wire it to a fresh collector
    pub fn new(config: ServerConfig, metrics_handle: Option<PrometheusHandle>) -> anyhow::Result<Self> {
        let metrics = MetricsCollector::new();
        let cascade = build_cascade_from_file(&config.classifiers_config, Arc::new(metrics.clone()))?;
        info!(
            path = %config.classifiers_config.display(),
            "Cascade loaded"
        );

        Ok(Self {
            config: Arc::new(config),
            cascade: Arc::new(cascade),
            metrics,
            metrics_handle,
        })
    }

    /// State around an already-built cascade
    pub fn with_cascade(
        config: ServerConfig,
        cascade: CascadeOrchestrator,
        metrics: MetricsCollector,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cascade: Arc::new(cascade),
            metrics,
            metrics_handle,
        }
    }
}
