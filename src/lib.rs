//! floe: an incremental loader for FHIR bundle objects.
//!
//! This library provides components for discovering JSON bundle files in an
//! object storage prefix and loading them into a raw warehouse table, with a
//! durable watermark so every run resumes exactly where the previous
//! successful run stopped.
//!
//! # Example
//!
//! ```no_run
//! use floe::{Config, Loader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.yaml")?;
//!     let loader = Loader::from_config(&config).await?;
//!     let summary = loader.run_once().await?;
//!     println!("Loaded {} objects", summary.loaded);
//!     Ok(())
//! }
//! ```

pub mod bundle;
pub mod config;
pub mod dlq;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod source;
pub mod storage;
pub mod warehouse;
pub mod watermark;

// Re-export main types
pub use config::Config;
pub use loader::{Loader, RunSummary};
pub use storage::{StorageProvider, StorageProviderRef};
pub use watermark::{Position, Watermark};
