//! Source side of the loader: discovery and retrieval of bundle objects.
//!
//! Provides a unified interface for listing and fetching bundle files from
//! various storage backends, behind a trait so tests can substitute an
//! in-memory store.

pub mod listing;

pub use listing::select_batch;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;
use crate::storage::StorageProviderRef;
use crate::watermark::Position;

/// Read access to the monitored feed of bundle objects.
///
/// The loader needs exactly two capabilities from the source store: list
/// object positions above a watermark, and fetch a body by key.
#[async_trait]
pub trait BundleSource: Send + Sync {
    /// List objects strictly above `after`, ascending by
    /// `(modified_at, key)`, truncated to `limit`.
    async fn discover(&self, after: &Position, limit: usize)
        -> Result<Vec<Position>, StorageError>;

    /// Fetch the body of the object at `key`.
    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError>;
}

/// [`BundleSource`] backed by a [`crate::storage::StorageProvider`] location.
pub struct StorageSource {
    storage: StorageProviderRef,
    suffix: String,
}

impl StorageSource {
    pub fn new(storage: StorageProviderRef, suffix: impl Into<String>) -> Self {
        Self {
            storage,
            suffix: suffix.into(),
        }
    }
}

#[async_trait]
impl BundleSource for StorageSource {
    async fn discover(
        &self,
        after: &Position,
        limit: usize,
    ) -> Result<Vec<Position>, StorageError> {
        listing::discover_above(&self.storage, after, &self.suffix, limit).await
    }

    async fn fetch(&self, key: &str) -> Result<Bytes, StorageError> {
        self.storage.get(key).await
    }
}
