//! Error types for floe using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },

    /// GCS configuration error.
    #[snafu(display("GCS configuration error"))]
    GcsConfig { source: object_store::Error },

    /// Azure configuration error.
    #[snafu(display("Azure configuration error"))]
    AzureConfig { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source URL is empty.
    #[snafu(display("Source URL cannot be empty"))]
    EmptySourceUrl,

    /// Warehouse URL is empty.
    #[snafu(display("Warehouse URL cannot be empty"))]
    EmptyWarehouseUrl,

    /// Warehouse table name is empty.
    #[snafu(display("Warehouse table name cannot be empty"))]
    EmptyTableName,

    /// Batch size must be positive.
    #[snafu(display("max_batch_size must be greater than zero"))]
    ZeroBatchSize,

    /// Fetch concurrency must be positive.
    #[snafu(display("max_concurrent_fetches must be greater than zero"))]
    ZeroFetchConcurrency,

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Bundle Errors ============

/// Errors raised while parsing an object body into a bundle document.
///
/// These are per-object failures: the loader isolates them, records the
/// object as failed, and continues with the rest of the batch.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BundleError {
    /// Body is not valid JSON.
    #[snafu(display("Invalid JSON in {key}: {source}"))]
    Json {
        key: String,
        source: serde_json::Error,
    },

    /// Body is valid JSON but not an object document.
    #[snafu(display("Document in {key} is not a JSON object (found {found})"))]
    Shape { key: String, found: &'static str },
}

// ============ Warehouse Errors ============

/// Errors that can occur while writing to or reading from the warehouse.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// Underlying storage operation failed.
    #[snafu(display("Warehouse storage operation failed"))]
    WarehouseStorage { source: StorageError },

    /// Failed to serialize a raw record envelope.
    #[snafu(display("Failed to serialize raw record for {key}"))]
    RecordSerialize {
        key: String,
        source: serde_json::Error,
    },

    /// Failed to serialize the watermark document.
    #[snafu(display("Failed to serialize watermark"))]
    WatermarkSerialize { source: serde_json::Error },

    /// Watermark document exists but cannot be decoded.
    #[snafu(display("Watermark document is corrupted"))]
    WatermarkCorrupted { source: serde_json::Error },

    /// Failed to serialize the table descriptor.
    #[snafu(display("Failed to serialize table descriptor"))]
    DescriptorSerialize { source: serde_json::Error },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ DLQ Errors ============

/// Errors that can occur during Dead Letter Queue operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
// Prefix is intentional to avoid snafu selector conflicts (e.g., WriteSnafu)
#[allow(clippy::enum_variant_names)]
pub enum DlqError {
    /// Failed to write to DLQ.
    #[snafu(display("Failed to write to DLQ"))]
    DlqWrite { source: StorageError },

    /// Failed to serialize failed object record.
    #[snafu(display("Failed to serialize DLQ record"))]
    DlqSerialize { source: serde_json::Error },

    /// Failed to create DLQ storage provider.
    #[snafu(display("Failed to create DLQ storage"))]
    DlqStorage { source: StorageError },
}

// ============ Loader Error (top-level) ============

/// Top-level loader errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoaderError {
    /// Source store error.
    #[snafu(display("Source storage error"))]
    SourceStorage { source: StorageError },

    /// Warehouse error.
    #[snafu(display("Warehouse error"))]
    Warehouse { source: WarehouseError },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// DLQ error.
    #[snafu(display("DLQ error"))]
    Dlq { source: DlqError },
}

impl LoaderError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            LoaderError::SourceStorage { source } => source.is_not_found(),
            LoaderError::Warehouse {
                source: WarehouseError::WarehouseStorage { source },
            } => source.is_not_found(),
            _ => false,
        }
    }
}
