//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Cascade configuration file (catalog, rules, tiers)
    #[serde(default = "default_classifiers")]
    pub classifiers_config: PathBuf,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Values given on the command line, applied over the file
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub classifiers_config: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    ///
    /// A missing file falls back to defaults.
    pub fn load(config_path: impl AsRef<Path>, overrides: &ServerOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        if let Some(listen) = &overrides.listen {
            config.listen = listen.clone();
        }

        if let Some(port) = overrides.port {
            config.port = port;
        }

        if let Some(path) = &overrides.classifiers_config {
            config.classifiers_config = path.clone();
        }

        Ok(config)
    }

    /// `listen:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            classifiers_config: default_classifiers(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_classifiers() -> PathBuf {
    PathBuf::from("config/vigilis.yaml")
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}
