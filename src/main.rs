//! floe: a standalone watermark loader for FHIR bundle objects.
//!
//! This tool watches an object storage prefix (S3, GCS, Azure, local
//! filesystem) for JSON bundle files and loads each one as a raw record into
//! a warehouse table, advancing a durable watermark only after the batch is
//! acknowledged so that interrupted runs resume without losing or
//! duplicating data.

mod bundle;
mod config;
mod dlq;
mod error;
mod loader;
mod metrics;
mod source;
mod storage;
mod warehouse;
mod watermark;

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{AddressParseSnafu, ConfigSnafu, LoaderError, MetricsSnafu};
use loader::Loader;

/// FHIR bundle watermark loader.
#[derive(Parser, Debug)]
#[command(name = "floe")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Keep polling for new objects instead of exiting after one run.
    #[arg(long)]
    watch: bool,

    /// Discover and parse without writing to the warehouse.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), LoaderError> {
    let args = Args::parse();

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("floe starting");

    let config = Config::from_file(&args.config).context(ConfigSnafu)?;

    // Initialize metrics if enabled
    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        metrics::init(addr).context(MetricsSnafu)?;
        debug!(
            "Metrics endpoint listening on http://{}/metrics",
            config.metrics.address
        );
    }

    let loader = Loader::from_config(&config)
        .await?
        .with_dry_run(args.dry_run);

    if args.watch {
        let shutdown = loader::shutdown_token();
        loader.run(config.source.poll_interval(), shutdown).await;
        info!("Loader stopped");
        return Ok(());
    }

    let summary = loader.run_once().await?;

    info!("Load completed successfully");
    info!("  Objects discovered: {}", summary.discovered);
    info!("  Objects loaded: {}", summary.loaded);
    info!("  Objects failed: {}", summary.failed);
    if let Some(position) = &summary.watermark {
        info!("  Watermark: {}", position);
    }

    Ok(())
}
