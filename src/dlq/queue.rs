//! Dead letter queue implementation.
//!
//! Records permanently skipped objects to a configurable storage location
//! for later inspection. Failures are written as NDJSON for easy parsing.

use bytes::Bytes;
use chrono::Utc;
use object_store::PutPayload;
use snafu::prelude::*;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ErrorHandlingConfig;
use crate::error::{DlqError, DlqSerializeSnafu, DlqStorageSnafu, DlqWriteSnafu};
use crate::metrics::events::FailureStage;
use crate::storage::StorageProvider;

use super::types::{FailedObject, FailureStats};

/// Dead letter queue for objects the loader permanently skips.
///
/// The watermark advances past malformed objects, so without a side record
/// they would never be looked at again. A fixed object is requeued by
/// rewriting it in the source prefix, which gives it a fresh modified time
/// above the watermark.
pub struct DeadLetterQueue {
    storage: Arc<StorageProvider>,
    buffer: Mutex<Vec<FailedObject>>,
    stats: Mutex<FailureStats>,
}

impl DeadLetterQueue {
    /// Create a DLQ from configuration.
    ///
    /// Returns `None` if no DLQ location is configured.
    pub async fn from_config(config: &ErrorHandlingConfig) -> Result<Option<Self>, DlqError> {
        let Some(dlq_url) = &config.dlq_url else {
            return Ok(None);
        };

        let storage =
            StorageProvider::for_url_with_options(dlq_url, config.dlq_storage_options.clone())
                .await
                .context(DlqStorageSnafu)?;

        info!("DLQ enabled at {}", storage.canonical_url());

        Ok(Some(Self {
            storage: Arc::new(storage),
            buffer: Mutex::new(Vec::new()),
            stats: Mutex::new(FailureStats::default()),
        }))
    }

    /// Record an object failure.
    pub async fn record_failure(&self, key: &str, error: &str, stage: FailureStage) {
        let failed = FailedObject {
            key: key.to_string(),
            error: error.to_string(),
            stage,
            timestamp: Utc::now(),
        };

        debug!("Recording DLQ failure: {} at stage {}", key, stage.as_str());

        {
            let mut stats = self.stats.lock().await;
            stats.increment(stage);
        }

        let mut buffer = self.buffer.lock().await;
        buffer.push(failed);
    }

    /// Flush buffered records to storage.
    ///
    /// Each flush writes a fresh timestamped NDJSON file, so successive
    /// loads never clobber earlier failure records.
    pub async fn flush(&self) -> Result<(), DlqError> {
        let records = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };

        let count = records.len();
        debug!("Flushing {} DLQ records", count);

        let mut ndjson = String::new();
        for record in &records {
            let line = serde_json::to_string(record).context(DlqSerializeSnafu)?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }

        let filename = format!(
            "failures-{}.ndjson",
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        );
        let path = object_store::path::Path::from(filename.as_str());
        let payload = PutPayload::from(Bytes::from(ndjson));
        self.storage
            .put(&path, payload)
            .await
            .context(DlqWriteSnafu)?;

        info!("Flushed {} records to DLQ file {}", count, filename);
        Ok(())
    }

    /// Flush any remaining records and log session totals.
    pub async fn finalize(&self) -> Result<(), DlqError> {
        self.flush().await?;

        let stats = self.stats.lock().await;
        if stats.total() > 0 {
            info!(
                "DLQ totals: {} failures (parse={}, shape={})",
                stats.total(),
                stats.parse,
                stats.shape
            );
        }
        Ok(())
    }
}
