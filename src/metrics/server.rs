//! Prometheus metrics endpoint.
//!
//! Installs the Prometheus recorder and exposes it over HTTP, together with
//! a health endpoint for liveness probes. Mostly useful in watch mode, where
//! the process lives long enough to be scraped.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::error;

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Initialize the Prometheus metrics exporter with an HTTP endpoint.
///
/// Starts an HTTP server on the given address that exposes:
/// - `/metrics` - Prometheus metrics in text format
/// - `/health` - Health check endpoint (returns 200 OK)
///
/// # Example
///
/// ```ignore
/// use std::net::SocketAddr;
/// use floe::metrics;
///
/// let addr: SocketAddr = "0.0.0.0:9090".parse().unwrap();
/// metrics::init(addr).expect("Failed to initialize metrics");
/// ```
pub fn init(addr: SocketAddr) -> Result<(), MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    // Serve in the background; a bind failure is logged, not fatal, because
    // the loader itself does not depend on the metrics endpoint
    tokio::spawn(serve(addr, handle));

    Ok(())
}

async fn serve(addr: SocketAddr, handle: PrometheusHandle) {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(|| async { "ok\n" }))
        .layer(Extension(handle));

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Metrics server error: {}", e);
    }
}

async fn render_metrics(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}
