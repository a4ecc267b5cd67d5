//! Configuration for the controller.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::installation::DEFAULT_BLOCKED_RETRY_INTERVAL;
use crate::registry::RegistriesConfig;

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes
    /// precedence when set.
    pub log_level: String,

    /// Number of concurrent reconcile workers.
    pub workers: usize,

    /// Upper bound for a single reconcile.
    pub reconcile_timeout: Duration,

    /// Delay before a blocked or waiting deletion is checked again.
    pub blocked_retry_interval: Duration,

    /// JSON file with the registry configuration.
    pub registry_config_path: Option<PathBuf>,

    /// Directory of JSON manifests loaded into the store at startup.
    pub manifest_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let log_level = std::env::var("LANDFORM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let workers = std::env::var("LANDFORM_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(landform_reconcile::DEFAULT_WORKERS);

        let reconcile_timeout = std::env::var("LANDFORM_RECONCILE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(landform_reconcile::DEFAULT_RECONCILE_TIMEOUT);

        let blocked_retry_interval = std::env::var("LANDFORM_BLOCKED_RETRY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_BLOCKED_RETRY_INTERVAL);

        let registry_config_path = std::env::var("LANDFORM_REGISTRY_CONFIG")
            .ok()
            .map(PathBuf::from);

        let manifest_dir = std::env::var("LANDFORM_MANIFEST_DIR").ok().map(PathBuf::from);

        Ok(Self {
            log_level,
            workers,
            reconcile_timeout,
            blocked_retry_interval,
            registry_config_path,
            manifest_dir,
        })
    }

    /// Read the registry configuration file, or the default (no backends)
    /// when none is configured.
    pub fn registries(&self) -> Result<RegistriesConfig> {
        let Some(path) = &self.registry_config_path else {
            return Ok(RegistriesConfig::default());
        };
        let raw = std::fs::read(path)
            .with_context(|| format!("reading registry config {}", path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("parsing registry config {}", path.display()))
    }
}
