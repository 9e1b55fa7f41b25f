//! The load protocol: watermark read, discovery, upsert, watermark advance.
//!
//! # Run protocol
//!
//! A single run moves one batch from the source prefix into the warehouse:
//!
//! 1. Ensure the warehouse table exists.
//! 2. Read the watermark; absent means start from the origin.
//! 3. Discover objects strictly above the watermark, ordered by
//!    `(modified_at, key)`, truncated to the batch size.
//! 4. Fetch bodies with bounded concurrency and parse each one. A fetch
//!    error aborts the run; a parse failure only skips that object.
//! 5. Upsert the parsed records, keyed by object key.
//! 6. Advance the watermark to the highest discovered position, counting
//!    skipped objects, and only after the upsert is acknowledged.
//!
//! The ordering of 5 and 6 is what makes a crash harmless: a re-run repeats
//! the same batch and the keyed upsert replaces rows instead of duplicating
//! them. Because the watermark also covers skipped objects, a malformed file
//! is never retried on its own; it stays visible in the DLQ instead.

mod signal;

pub use signal::shutdown_token;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use snafu::{Report, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bundle::{ParsedBundle, RawRecord, parse_bundle};
use crate::config::Config;
use crate::dlq::DeadLetterQueue;
use crate::emit;
use crate::error::{
    BundleError, DlqSnafu, LoaderError, SourceStorageSnafu, StorageError, WarehouseSnafu,
    WarehouseStorageSnafu,
};
use crate::metrics::events::{
    BundleRecords, FetchCompleted, ObjectFailed, ObjectsDiscovered, ObjectsLoaded, RunCompleted,
    RunDuration, RunOutcome, WatermarkLag,
};
use crate::source::{BundleSource, StorageSource};
use crate::storage::StorageProvider;
use crate::warehouse::{StorageWarehouse, Warehouse};
use crate::watermark::{Position, Watermark};

/// Outcome of a single load run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Objects discovered above the watermark, capped at the batch size.
    pub discovered: usize,
    /// Objects parsed and upserted.
    pub loaded: usize,
    /// Objects permanently skipped as malformed.
    pub failed: usize,
    /// Watermark position after the run; `None` until a first load commits.
    pub watermark: Option<Position>,
}

/// Incremental loader over a bundle source and a warehouse.
pub struct Loader<S, W> {
    source: S,
    warehouse: W,
    dlq: Option<Arc<DeadLetterQueue>>,
    max_batch_size: usize,
    max_concurrent_fetches: usize,
    dry_run: bool,
}

impl<S, W> Loader<S, W>
where
    S: BundleSource,
    W: Warehouse,
{
    pub fn new(source: S, warehouse: W) -> Self {
        Self {
            source,
            warehouse,
            dlq: None,
            max_batch_size: 100,
            max_concurrent_fetches: 4,
            dry_run: false,
        }
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn with_fetch_concurrency(mut self, max_concurrent_fetches: usize) -> Self {
        self.max_concurrent_fetches = max_concurrent_fetches;
        self
    }

    pub fn with_dlq(mut self, dlq: Option<Arc<DeadLetterQueue>>) -> Self {
        self.dlq = dlq;
        self
    }

    /// Discover and parse without writing anything.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute one load run.
    ///
    /// Safe to invoke again after any failure: nothing before the final
    /// watermark write commits the run, and the upsert is idempotent per key.
    pub async fn run_once(&self) -> Result<RunSummary, LoaderError> {
        let start = Instant::now();

        // Dry runs only read, so schema setup is skipped along with the writes
        if !self.dry_run {
            self.warehouse.ensure_schema().await.context(WarehouseSnafu)?;
        }

        let watermark = self.warehouse.read_watermark().await.context(WarehouseSnafu)?;
        let after = match &watermark {
            Some(watermark) => {
                debug!("Resuming above watermark {}", watermark.position);
                watermark.position.clone()
            }
            None => {
                info!("No watermark found, loading from the beginning");
                Position::origin()
            }
        };

        let batch = self
            .source
            .discover(&after, self.max_batch_size)
            .await
            .context(SourceStorageSnafu)?;
        emit!(ObjectsDiscovered {
            count: batch.len() as u64
        });

        // The batch is ordered, so its last element is the position the
        // watermark moves to, whether or not every object loads cleanly.
        let Some(high) = batch.last().cloned() else {
            debug!("No objects above the watermark");
            emit!(RunCompleted {
                outcome: RunOutcome::Idle
            });
            emit!(RunDuration {
                duration: start.elapsed(),
            });
            return Ok(RunSummary {
                watermark: watermark.map(|w| w.position),
                ..RunSummary::default()
            });
        };

        let discovered = batch.len();
        info!("Discovered {} objects above watermark", discovered);

        let fetched = self.fetch_batch(batch).await?;

        let mut records = Vec::with_capacity(discovered);
        let mut failures = Vec::new();
        for (position, parsed) in fetched {
            match parsed {
                Ok(bundle) => {
                    if let Some(count) = bundle.record_count {
                        emit!(BundleRecords {
                            count: count as u64
                        });
                    }
                    records.push(RawRecord::new(position.key, bundle, position.modified_at));
                }
                Err(e) => {
                    warn!("Skipping malformed object: {e}");
                    emit!(ObjectFailed { stage: e.stage() });
                    failures.push(e);
                }
            }
        }

        let loaded = records.len();
        let failed = failures.len();

        if self.dry_run {
            info!(
                "Dry run: {} objects would be loaded, {} skipped as malformed",
                loaded, failed
            );
            return Ok(RunSummary {
                discovered,
                loaded,
                failed,
                watermark: watermark.map(|w| w.position),
            });
        }

        self.warehouse
            .upsert_raw(&records)
            .await
            .context(WarehouseSnafu)?;

        // files_processed counts skipped objects too: the watermark covers
        // them, so the history must account for them.
        let files_processed = loaded + failed;
        let position = match &watermark {
            Some(current) if !current.precedes(&high) => {
                warn!(
                    "Batch high position {} does not advance watermark {}, leaving it unchanged",
                    high, current.position
                );
                current.position.clone()
            }
            _ => {
                let next = Watermark::at(high);
                let load_id = self
                    .warehouse
                    .write_watermark(&next, files_processed)
                    .await
                    .context(WarehouseSnafu)?;
                let lag = (Utc::now() - next.position.modified_at).num_milliseconds() as f64
                    / 1000.0;
                emit!(WatermarkLag { seconds: lag });
                info!("Watermark advanced to {} (load {})", next.position, load_id);
                next.position
            }
        };

        // Failures are recorded only after the watermark commit, so a run
        // that aborts earlier leaves nothing buffered for its retry to
        // re-record. A DLQ write failure must not fail the committed load.
        if let Some(dlq) = &self.dlq {
            for failure in &failures {
                dlq.record_failure(failure.key(), &failure.to_string(), failure.stage())
                    .await;
            }
            if let Err(e) = dlq.flush().await {
                error!("Failed to flush DLQ: {e}");
            }
        }

        emit!(ObjectsLoaded {
            count: loaded as u64
        });
        emit!(RunCompleted {
            outcome: RunOutcome::Loaded
        });
        emit!(RunDuration {
            duration: start.elapsed(),
        });
        info!(
            "Load complete: {} discovered, {} loaded, {} failed",
            discovered, loaded, failed
        );

        Ok(RunSummary {
            discovered,
            loaded,
            failed,
            watermark: Some(position),
        })
    }

    /// Fetch and parse a batch with bounded, order-preserving concurrency.
    ///
    /// Fetch errors abort the whole run; parse outcomes are returned
    /// per object.
    async fn fetch_batch(
        &self,
        batch: Vec<Position>,
    ) -> Result<Vec<(Position, Result<ParsedBundle, BundleError>)>, LoaderError> {
        let source = &self.source;

        stream::iter(batch.into_iter().map(|position| async move {
            let fetch_start = Instant::now();
            let body = source.fetch(&position.key).await?;
            emit!(FetchCompleted {
                duration: fetch_start.elapsed(),
            });
            let parsed = parse_bundle(&position.key, &body);
            Ok::<_, StorageError>((position, parsed))
        }))
        .buffered(self.max_concurrent_fetches)
        .try_collect()
        .await
        .context(SourceStorageSnafu)
    }

    /// Run until shutdown, polling the source at the given interval.
    ///
    /// A failed run is logged and retried at the next poll; only
    /// cancellation stops the loop, and it waits for the run in flight
    /// before doing so.
    pub async fn run(&self, poll_interval: Duration, shutdown: CancellationToken) {
        info!(
            "Starting loader (polling every {}s)",
            poll_interval.as_secs()
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, stopping loader");
                break;
            }

            // An in-flight run is never interrupted; cancellation takes
            // effect between runs and during the poll wait.
            match self.run_once().await {
                Ok(summary) if summary.discovered == 0 => {
                    debug!(
                        "No new objects, waiting {}s before next poll",
                        poll_interval.as_secs()
                    );
                }
                Ok(summary) => {
                    info!(
                        "Iteration complete ({} loaded), waiting {}s before next poll",
                        summary.loaded,
                        poll_interval.as_secs()
                    );
                }
                Err(e) => {
                    emit!(RunCompleted {
                        outcome: RunOutcome::Failed
                    });
                    error!("Load failed, retrying next poll: {}", Report::from_error(e));
                }
            }

            if shutdown
                .run_until_cancelled(tokio::time::sleep(poll_interval))
                .await
                .is_none()
            {
                info!("Shutdown requested during poll wait");
                break;
            }
        }

        if let Some(dlq) = &self.dlq {
            if let Err(e) = dlq.finalize().await {
                error!("Failed to finalize DLQ: {e}");
            }
        }
    }
}

impl Loader<StorageSource, StorageWarehouse> {
    /// Wire a loader from configuration: source prefix, warehouse table,
    /// and optional DLQ.
    pub async fn from_config(config: &Config) -> Result<Self, LoaderError> {
        let source_storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.source.url,
                config.source.storage_options.clone(),
            )
            .await
            .context(SourceStorageSnafu)?,
        );
        let source = StorageSource::new(source_storage, config.source.suffix.as_str());

        let warehouse_storage = Arc::new(
            StorageProvider::for_url_with_options(
                &config.warehouse.url,
                config.warehouse.storage_options.clone(),
            )
            .await
            .context(WarehouseStorageSnafu)
            .context(WarehouseSnafu)?,
        );
        let warehouse = StorageWarehouse::new(warehouse_storage, config.warehouse.table.as_str());

        let dlq = DeadLetterQueue::from_config(&config.error_handling)
            .await
            .context(DlqSnafu)?
            .map(Arc::new);

        Ok(Self::new(source, warehouse)
            .with_max_batch_size(config.source.max_batch_size)
            .with_fetch_concurrency(config.source.max_concurrent_fetches)
            .with_dlq(dlq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_default() {
        let summary = RunSummary::default();
        assert_eq!(summary.discovered, 0);
        assert_eq!(summary.loaded, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.watermark, None);
    }
}
