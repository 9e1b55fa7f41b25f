//! Multi-cloud storage abstraction.
//!
//! Provides a unified interface for working with S3, GCS, Azure Blob Storage,
//! and local filesystem. Both sides of the loader sit on this: the monitored
//! source prefix and the warehouse root are plain storage URLs.

mod azure;
mod gcs;
mod local;
mod s3;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, future::ready};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload, RetryConfig};
use regex::Regex;
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

// Re-export config types
pub use azure::AzureConfig;
pub use gcs::GcsConfig;
pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider that abstracts over different cloud storage backends.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

/// A listed object: its path relative to the configured prefix, plus the
/// last-modified time the backend reported for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    pub path: Path,
    pub modified_at: DateTime<Utc>,
}

// URL patterns for different storage backends
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_URL: &str = r"^file:(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

const GCS_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-_\.]+)\.storage\.googleapis\.com(/(?P<key>.+))?$";
const GCS_PATH: &str =
    r"^https://storage\.googleapis\.com/(?P<bucket>[a-z0-9\-_\.]+)(/(?P<key>.+))?$";
const GCS_URL: &str = r"^[gG][sS]://(?P<bucket>[a-z0-9\-\._]+)(/(?P<key>.+))?$";

const ABFS_URL: &str = r"^abfss?://(?P<container>[a-z0-9\-]+)@(?P<account>[a-z0-9]+)\.dfs\.core\.windows\.net(/(?P<key>.+))?$";
const AZURE_HTTPS: &str = r"^https://(?P<account>[a-z0-9]+)\.(blob|dfs)\.core\.windows\.net/(?P<container>[a-z0-9\-]+)(/(?P<key>.+))?$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Gcs,
    Azure,
    Local,
}

fn matchers() -> &'static HashMap<Backend, Vec<Regex>> {
    static MATCHERS: OnceLock<HashMap<Backend, Vec<Regex>>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        let mut m = HashMap::new();

        m.insert(
            Backend::S3,
            vec![
                Regex::new(S3_PATH).unwrap(),
                Regex::new(S3_VIRTUAL).unwrap(),
                Regex::new(S3_ENDPOINT_URL).unwrap(),
                Regex::new(S3_URL).unwrap(),
            ],
        );

        m.insert(
            Backend::Gcs,
            vec![
                Regex::new(GCS_PATH).unwrap(),
                Regex::new(GCS_VIRTUAL).unwrap(),
                Regex::new(GCS_URL).unwrap(),
            ],
        );

        m.insert(
            Backend::Azure,
            vec![
                Regex::new(ABFS_URL).unwrap(),
                Regex::new(AZURE_HTTPS).unwrap(),
            ],
        );

        m.insert(
            Backend::Local,
            vec![
                Regex::new(FILE_URI).unwrap(),
                Regex::new(FILE_URL).unwrap(),
                Regex::new(FILE_PATH).unwrap(),
            ],
        );

        m
    })
}

/// Retry configuration shared by the cloud backends.
pub(super) fn default_retry_config() -> RetryConfig {
    RetryConfig::default()
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Gcs(GcsConfig),
    Azure(AzureConfig),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, patterns) in matchers() {
            if let Some(matches) = patterns.iter().filter_map(|r| r.captures(url)).next() {
                return match backend {
                    Backend::S3 => Self::parse_s3(matches),
                    Backend::Gcs => Self::parse_gcs(matches),
                    Backend::Azure => Self::parse_azure(matches),
                    Backend::Local => Self::parse_local(matches),
                };
            }
        }

        InvalidUrlSnafu {
            url: url.to_string(),
        }
        .fail()
    }

    fn parse_s3(matches: regex::Captures) -> Result<Self, StorageError> {
        let bucket = matches
            .name("bucket")
            .expect("bucket should always be available")
            .as_str()
            .to_string();

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| matches.name("region").map(|m| m.as_str().to_string()));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            matches.name("endpoint").map(|endpoint| {
                let port = matches
                    .name("port")
                    .and_then(|p| p.as_str().parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = matches
                    .name("protocol")
                    .map(|p| p.as_str())
                    .unwrap_or("https");
                format!("{}://{}:{}", protocol, endpoint.as_str(), port)
            })
        });

        let key = matches.name("key").map(|m| m.as_str().into());

        Ok(BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket,
            key,
        }))
    }

    fn parse_gcs(matches: regex::Captures) -> Result<Self, StorageError> {
        let bucket = matches
            .name("bucket")
            .expect("bucket should always be available")
            .as_str()
            .to_string();

        let key = matches.name("key").map(|m| m.as_str().into());

        Ok(BackendConfig::Gcs(GcsConfig { bucket, key }))
    }

    fn parse_azure(matches: regex::Captures) -> Result<Self, StorageError> {
        let container = matches
            .name("container")
            .expect("container should always be available")
            .as_str()
            .to_string();

        let account = matches
            .name("account")
            .expect("account should always be available")
            .as_str()
            .to_string();

        let key = matches.name("key").map(|m| m.as_str().into());

        Ok(BackendConfig::Azure(AzureConfig {
            account,
            container,
            key,
        }))
    }

    fn parse_local(matches: regex::Captures) -> Result<Self, StorageError> {
        let path = matches
            .name("path")
            .expect("path regex must contain a path group")
            .as_str();

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        Ok(BackendConfig::Local(LocalConfig { path, key: None }))
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Gcs(gcs) => gcs.key.as_ref(),
            BackendConfig::Azure(azure) => azure.key.as_ref(),
            BackendConfig::Local(local) => local.key.as_ref(),
        }
    }
}

impl StorageProvider {
    /// Create a storage provider for the given URL with storage options.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;

        match config {
            BackendConfig::S3(config) => Self::construct_s3(config, options).await,
            BackendConfig::Gcs(config) => Self::construct_gcs(config).await,
            BackendConfig::Azure(config) => Self::construct_azure(config).await,
            BackendConfig::Local(config) => Self::construct_local(config).await,
        }
    }

    /// Create a storage provider for the given URL with default options.
    pub async fn for_url(url: &str) -> Result<Self, StorageError> {
        Self::for_url_with_options(url, HashMap::new()).await
    }

    /// List objects under the configured prefix, recursively.
    ///
    /// Returns entries whose paths are relative to the configured key prefix,
    /// matching the contract of `get`/`put` which qualify paths, and carries
    /// the backend's last-modified timestamp for each object.
    pub async fn list_entries(
        &self,
    ) -> Result<impl Stream<Item = Result<ObjectEntry, object_store::Error>> + '_, StorageError>
    {
        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::Success,
        });

        let key_path: Option<Path> = self.config.key().map(|key| key.to_string().into());
        let key_part_count = key_path
            .as_ref()
            .map(|key| key.parts().count())
            .unwrap_or_default();

        let list = self
            .object_store
            .list(key_path.as_ref())
            .filter_map(move |meta| {
                let result = match meta {
                    Ok(metadata) => {
                        // Strip the prefix so callers get relative paths
                        let relative_path: Path =
                            metadata.location.parts().skip(key_part_count).collect();
                        Some(Ok(ObjectEntry {
                            path: relative_path,
                            modified_at: metadata.last_modified,
                        }))
                    }
                    Err(err) => Some(Err(err)),
                };
                ready(result)
            });

        Ok(list)
    }

    /// Get the contents of an object.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(&path)).await;

        let status = if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        };
        emit!(StorageRequest {
            operation: StorageOperation::Get,
            status,
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Get,
            duration: start.elapsed(),
        });

        let bytes = result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;
        Ok(bytes)
    }

    /// Put a payload to a path. The write replaces any existing object,
    /// which is what makes keyed re-loads idempotent.
    pub async fn put(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put(&path, payload).await;

        let status = if result.is_ok() {
            RequestStatus::Success
        } else {
            RequestStatus::Error
        };
        emit!(StorageRequest {
            operation: StorageOperation::Put,
            status,
        });
        emit!(StorageRequestDuration {
            operation: StorageOperation::Put,
            duration: start.elapsed(),
        });

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Put raw bytes to a path.
    pub async fn put_bytes(
        &self,
        path: impl Into<Path>,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError> {
        let path = path.into();
        self.put(&path, PutPayload::from(Bytes::from(bytes))).await
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// Canonical URL identifying this storage location.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_s3_url_parsing() {
        let config = BackendConfig::parse_url("s3://mybucket/raw/patients").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.key, Some(Path::from("raw/patients")));
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_s3_endpoint_url_parsing() {
        let config = BackendConfig::parse_url("s3::http://localhost:9000/mybucket/raw").unwrap();
        match config {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.bucket, "mybucket");
                assert_eq!(s3.key, Some(Path::from("raw")));
                // AWS_ENDPOINT overrides the parsed endpoint when set, so
                // only check it against a clean environment
                if std::env::var("AWS_ENDPOINT").is_err() {
                    assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
                }
            }
            _ => panic!("Expected S3 config"),
        }
    }

    #[test]
    fn test_gcs_url_parsing() {
        let config = BackendConfig::parse_url("gs://mybucket/raw/patients").unwrap();
        match config {
            BackendConfig::Gcs(gcs) => {
                assert_eq!(gcs.bucket, "mybucket");
                assert_eq!(gcs.key, Some(Path::from("raw/patients")));
            }
            _ => panic!("Expected Gcs config"),
        }
    }

    #[test]
    fn test_azure_url_parsing() {
        let config = BackendConfig::parse_url(
            "abfss://mycontainer@mystorageaccount.dfs.core.windows.net/raw/patients",
        )
        .unwrap();
        match config {
            BackendConfig::Azure(azure) => {
                assert_eq!(azure.account, "mystorageaccount");
                assert_eq!(azure.container, "mycontainer");
                assert_eq!(azure.key, Some(Path::from("raw/patients")));
            }
            _ => panic!("Expected Azure config"),
        }
    }

    #[test]
    fn test_local_url_parsing() {
        let config = BackendConfig::parse_url("/data/landing/raw").unwrap();
        match config {
            BackendConfig::Local(local) => {
                assert_eq!(local.path, "/data/landing/raw");
            }
            _ => panic!("Expected Local config"),
        }
    }

    #[test]
    fn test_invalid_url_rejected() {
        let err = BackendConfig::parse_url("ftp://nope/raw").unwrap_err();
        assert!(matches!(err, StorageError::InvalidUrl { .. }));
    }

    /// list_entries() must return paths relative to the configured prefix so
    /// that get() does not double-qualify them.
    #[tokio::test]
    async fn test_list_entries_returns_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path();

        let nested = base_path.join("raw/patients/p-0001");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("bundle.json"), b"{}").unwrap();

        let storage_url = format!("{}/raw/patients", base_path.display());
        let storage = StorageProvider::for_url(&storage_url).await.unwrap();

        let mut stream = storage.list_entries().await.unwrap();
        let mut entries = Vec::new();
        while let Some(result) = stream.next().await {
            entries.push(result.unwrap());
        }

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path.as_ref(), "p-0001/bundle.json");

        // The relative path must round-trip through get()
        let content = storage.get(entries[0].path.clone()).await.unwrap();
        assert_eq!(content.as_ref(), b"{}");
    }

    #[tokio::test]
    async fn test_list_entries_carries_modified_at() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("bundle.json"), b"{}").unwrap();

        let storage = StorageProvider::for_url(&temp_dir.path().display().to_string())
            .await
            .unwrap();

        let mut stream = storage.list_entries().await.unwrap();
        let entry = stream.next().await.unwrap().unwrap();

        // mtime of a file written just now is close to the current instant
        let age = Utc::now() - entry.modified_at;
        assert!(age.num_seconds().abs() < 60);
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url(&temp_dir.path().display().to_string())
            .await
            .unwrap();

        storage
            .put_bytes("p-0002/bundle.json", b"{\"entry\": []}".to_vec())
            .await
            .unwrap();

        let content = storage.get("p-0002/bundle.json").await.unwrap();
        assert_eq!(content.as_ref(), b"{\"entry\": []}");
    }

    #[tokio::test]
    async fn test_get_missing_object_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_url(&temp_dir.path().display().to_string())
            .await
            .unwrap();

        let err = storage.get("no/such/object.json").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
