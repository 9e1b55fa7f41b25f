//! Warehouse side of the loader: durable records and the watermark.
//!
//! The loader only ever talks to the warehouse through the [`Warehouse`]
//! trait, so the protocol can be tested against an in-memory fake and the
//! backing store can be swapped without touching the run loop.

pub mod store;

pub use store::{StorageWarehouse, TableDescriptor, WatermarkRecord};

use async_trait::async_trait;

use crate::bundle::RawRecord;
use crate::error::WarehouseError;
use crate::watermark::Watermark;

/// Durable storage for raw records and the load watermark.
///
/// `write_watermark` must only be called after `upsert_raw` has been
/// acknowledged for the same batch; the watermark is the commit point that
/// makes a load visible to the next run.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the target table layout if it does not exist yet. A no-op when
    /// the table is already present.
    async fn ensure_schema(&self) -> Result<(), WarehouseError>;

    /// Durably upsert a batch of raw records keyed by source object key.
    ///
    /// Returns only once every record is acknowledged. Upserting a key that
    /// already exists replaces the stored row, which is what makes re-running
    /// a partially completed load safe.
    async fn upsert_raw(&self, records: &[RawRecord]) -> Result<(), WarehouseError>;

    /// Read the current watermark, or `None` before the first completed load.
    async fn read_watermark(&self) -> Result<Option<Watermark>, WarehouseError>;

    /// Durably record an advanced watermark together with the number of
    /// files the load processed. Returns the load id assigned to the advance.
    async fn write_watermark(
        &self,
        watermark: &Watermark,
        files_processed: usize,
    ) -> Result<u64, WarehouseError>;
}
