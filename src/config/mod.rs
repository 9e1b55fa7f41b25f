//! Configuration parsing and validation.
//!
//! Handles loading loader configuration from YAML files, with environment
//! variable interpolation applied to the raw text before parsing.

mod vars;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{
    ConfigError, EmptySourceUrlSnafu, EmptyTableNameSnafu, EmptyWarehouseUrlSnafu,
    EnvInterpolationSnafu, ReadFileSnafu, YamlParseSnafu, ZeroBatchSizeSnafu,
    ZeroFetchConcurrencySnafu,
};

/// Main configuration structure for the loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub warehouse: WarehouseConfig,
    /// Metrics configuration (optional, disabled by default).
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Error handling configuration (optional).
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
}

/// Source configuration: the monitored object-store prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Storage URL of the monitored prefix.
    /// Examples: "s3://synthea-fhir-data-dump/raw/patients", "/data/landing"
    pub url: String,

    /// Only keys ending with this suffix are eligible for loading
    /// (default: ".json"). Upload-pipeline marker files stay invisible.
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,

    /// Maximum objects discovered per invocation (default: 100).
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum concurrent body fetches within a batch (default: 4).
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Interval in seconds between invocations in watch mode (default: 300).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl SourceConfig {
    /// Watch-mode cadence as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_suffix() -> String {
    ".json".to_string()
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_poll_interval_secs() -> u64 {
    300
}

/// Warehouse configuration: where the raw layer lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Storage URL of the warehouse root.
    /// Examples: "s3://bucket/warehouse", "file:///var/lib/floe/warehouse"
    pub url: String,

    /// Name of the raw table (default: "fhir_bundles").
    #[serde(default = "default_table")]
    pub table: String,

    /// Storage options (credentials, region, etc.)
    #[serde(default)]
    pub storage_options: HashMap<String, String>,
}

fn default_table() -> String {
    "fhir_bundles".to_string()
}

/// Metrics configuration for the Prometheus endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics exposure is enabled (default: false; the default
    /// one-shot mode rarely lives long enough to be scraped).
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    false
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

/// Error handling configuration for malformed objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandlingConfig {
    /// Storage URL to write failed object records to (required for DLQ).
    #[serde(default)]
    pub dlq_url: Option<String>,
    /// Storage options for the DLQ location (credentials, region, etc.)
    #[serde(default)]
    pub dlq_storage_options: HashMap<String, String>,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_options(path, true)
    }

    /// Load configuration from a YAML file with optional environment variable
    /// interpolation.
    pub fn from_file_with_options(
        path: impl AsRef<Path>,
        interpolate_env: bool,
    ) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).context(ReadFileSnafu)?;

        let content = if interpolate_env {
            let result = vars::interpolate(&content);
            if !result.is_ok() {
                let message = result.errors.join("\n");
                return EnvInterpolationSnafu { message }.fail();
            }
            result.text
        } else {
            content
        };

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content).context(YamlParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.source.url.is_empty(), EmptySourceUrlSnafu);
        ensure!(!self.warehouse.url.is_empty(), EmptyWarehouseUrlSnafu);
        ensure!(!self.warehouse.table.is_empty(), EmptyTableNameSnafu);
        ensure!(self.source.max_batch_size > 0, ZeroBatchSizeSnafu);
        ensure!(
            self.source.max_concurrent_fetches > 0,
            ZeroFetchConcurrencySnafu
        );
        Ok(())
    }
}
