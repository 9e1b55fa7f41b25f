//! Process signal wiring for watch mode.

use tokio_util::sync::CancellationToken;
use tracing::info;

/// A token that trips when the process receives SIGINT, SIGTERM, or SIGQUIT.
///
/// Cancellation is cooperative: the watch loop lets the in-flight run finish
/// before it exits, so a signal never interrupts a half-written batch.
#[cfg(unix)]
pub fn shutdown_token() -> CancellationToken {
    use tokio::signal::unix::{SignalKind, signal};

    let token = CancellationToken::new();

    let trip = token.clone();
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to set up SIGINT handler");
        let mut sigterm =
            signal(SignalKind::terminate()).expect("Failed to set up SIGTERM handler");
        let mut sigquit = signal(SignalKind::quit()).expect("Failed to set up SIGQUIT handler");

        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
            _ = sigquit.recv() => "SIGQUIT",
        };
        info!(signal = name, "Shutdown signal received");
        trip.cancel();
    });

    token
}
