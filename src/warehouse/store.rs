//! Object-store backed warehouse.
//!
//! Layout under the warehouse root:
//!
//! ```text
//! <table>/<object key>            one JSON envelope per loaded object
//! _floe/table.json                table descriptor, written once
//! _floe/watermark.json            current watermark, rewritten on every load
//! _floe/loads/load-<id>.json      load history, one entry per completed load
//! ```
//!
//! A put either fully replaces the target object or fails, so re-running a
//! load rewrites the same envelope keys instead of duplicating rows. The
//! watermark document is only written after every envelope in the batch has
//! been acknowledged, which makes it the commit point of a load.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::bundle::RawRecord;
use crate::emit;
use crate::error::{
    DescriptorSerializeSnafu, RecordSerializeSnafu, WarehouseError, WarehouseStorageSnafu,
    WatermarkCorruptedSnafu, WatermarkSerializeSnafu,
};
use crate::metrics::events::UpsertCompleted;
use crate::storage::StorageProviderRef;
use crate::watermark::{Position, Watermark};

use super::Warehouse;

/// Current table descriptor document.
const TABLE_DOC: &str = "_floe/table.json";

/// Current watermark document, the commit point of every load.
const WATERMARK_DOC: &str = "_floe/watermark.json";

/// Prefix for per-load history entries.
const LOADS_PREFIX: &str = "_floe/loads";

/// Descriptor format written by this version of the loader.
const FORMAT_VERSION: u32 = 1;

/// Concurrent envelope puts per upsert batch.
const UPSERT_CONCURRENCY: usize = 4;

/// Table descriptor document, written when the table is first created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
}

/// On-disk form of the watermark document and of load history entries.
///
/// Flattened rather than nesting a position so the JSON stays greppable from
/// the shell during an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkRecord {
    pub modified_at: DateTime<Utc>,
    pub key: String,
    pub updated_at: DateTime<Utc>,
    pub load_id: u64,
    pub files_processed: usize,
}

impl WatermarkRecord {
    fn from_watermark(watermark: &Watermark, load_id: u64, files_processed: usize) -> Self {
        Self {
            modified_at: watermark.position.modified_at,
            key: watermark.position.key.clone(),
            updated_at: watermark.updated_at,
            load_id,
            files_processed,
        }
    }

    fn into_watermark(self) -> Watermark {
        Watermark {
            position: Position::new(self.modified_at, self.key),
            updated_at: self.updated_at,
        }
    }
}

/// [`Warehouse`] over an object storage location.
pub struct StorageWarehouse {
    storage: StorageProviderRef,
    table: String,
}

impl StorageWarehouse {
    pub fn new(storage: StorageProviderRef, table: impl Into<String>) -> Self {
        Self {
            storage,
            table: table.into(),
        }
    }

    /// The storage path of the envelope for a source object key.
    fn envelope_path(&self, key: &str) -> String {
        format!("{}/{}", self.table, key)
    }

    async fn put_record(&self, record: &RawRecord) -> Result<(), WarehouseError> {
        let body = serde_json::to_vec(record).context(RecordSerializeSnafu {
            key: record.key.clone(),
        })?;

        self.storage
            .put_bytes(self.envelope_path(&record.key), body)
            .await
            .context(WarehouseStorageSnafu)
    }

    /// Read the watermark document in its on-disk form.
    async fn read_watermark_record(&self) -> Result<Option<WatermarkRecord>, WarehouseError> {
        match self.storage.get(WATERMARK_DOC).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes).context(WatermarkCorruptedSnafu)?;
                Ok(Some(record))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).context(WarehouseStorageSnafu),
        }
    }
}

#[async_trait]
impl Warehouse for StorageWarehouse {
    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        match self.storage.get(TABLE_DOC).await {
            Ok(bytes) => {
                match serde_json::from_slice::<TableDescriptor>(&bytes) {
                    Ok(descriptor) => debug!(
                        "Table {} present (format v{})",
                        descriptor.name, descriptor.format_version
                    ),
                    Err(e) => warn!("Table descriptor unreadable, leaving in place: {e}"),
                }
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                let descriptor = TableDescriptor {
                    name: self.table.clone(),
                    format_version: FORMAT_VERSION,
                    created_at: Utc::now(),
                };
                let body =
                    serde_json::to_vec_pretty(&descriptor).context(DescriptorSerializeSnafu)?;
                self.storage
                    .put_bytes(TABLE_DOC, body)
                    .await
                    .context(WarehouseStorageSnafu)?;
                info!("Created table {} (format v{})", self.table, FORMAT_VERSION);
                Ok(())
            }
            Err(e) => Err(e).context(WarehouseStorageSnafu),
        }
    }

    async fn upsert_raw(&self, records: &[RawRecord]) -> Result<(), WarehouseError> {
        if records.is_empty() {
            return Ok(());
        }

        let start = Instant::now();

        let puts: Vec<_> = records.iter().map(|record| self.put_record(record)).collect();
        stream::iter(puts)
            .buffer_unordered(UPSERT_CONCURRENCY)
            .try_collect::<()>()
            .await?;

        emit!(UpsertCompleted {
            duration: start.elapsed(),
        });
        debug!("Upserted {} records into {}", records.len(), self.table);

        Ok(())
    }

    async fn read_watermark(&self) -> Result<Option<Watermark>, WarehouseError> {
        let record = self.read_watermark_record().await?;
        Ok(record.map(WatermarkRecord::into_watermark))
    }

    async fn write_watermark(
        &self,
        watermark: &Watermark,
        files_processed: usize,
    ) -> Result<u64, WarehouseError> {
        let load_id = match self.read_watermark_record().await? {
            Some(previous) => previous.load_id + 1,
            None => 1,
        };

        let record = WatermarkRecord::from_watermark(watermark, load_id, files_processed);
        let body = serde_json::to_vec_pretty(&record).context(WatermarkSerializeSnafu)?;

        // History entry first; the watermark document must be the last write
        // of the load so a crash in between leaves the old watermark intact.
        let history_path = format!("{LOADS_PREFIX}/load-{load_id:010}.json");
        self.storage
            .put_bytes(history_path, body.clone())
            .await
            .context(WarehouseStorageSnafu)?;
        self.storage
            .put_bytes(WATERMARK_DOC, body)
            .await
            .context(WarehouseStorageSnafu)?;

        debug!("Watermark advanced to {} (load {})", watermark.position, load_id);

        Ok(load_id)
    }
}
