//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the loader.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Outcome of a completed invocation.
#[derive(Debug, Clone, Copy)]
pub enum RunOutcome {
    Loaded,
    Idle,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Loaded => "loaded",
            RunOutcome::Idle => "idle",
            RunOutcome::Failed => "failed",
        }
    }
}

/// Event emitted when an invocation finishes.
pub struct RunCompleted {
    pub outcome: RunOutcome,
}

impl InternalEvent for RunCompleted {
    fn emit(self) {
        trace!(outcome = self.outcome.as_str(), "Run completed");
        counter!("floe_runs_total", "outcome" => self.outcome.as_str()).increment(1);
    }
}

/// Event emitted with the duration of a whole invocation.
pub struct RunDuration {
    pub duration: Duration,
}

impl InternalEvent for RunDuration {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Run duration");
        histogram!("floe_run_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a batch of objects is discovered above the watermark.
pub struct ObjectsDiscovered {
    pub count: u64,
}

impl InternalEvent for ObjectsDiscovered {
    fn emit(self) {
        trace!(count = self.count, "Objects discovered");
        counter!("floe_objects_discovered_total").increment(self.count);
        gauge!("floe_pending_objects").set(self.count as f64);
    }
}

/// Event emitted when objects are durably upserted into the warehouse.
pub struct ObjectsLoaded {
    pub count: u64,
}

impl InternalEvent for ObjectsLoaded {
    fn emit(self) {
        trace!(count = self.count, "Objects loaded");
        counter!("floe_objects_loaded_total").increment(self.count);
    }
}

/// Stage at which a per-object failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// Body is not valid JSON.
    Parse,
    /// Body is valid JSON but not an object document.
    Shape,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Parse => "parse",
            FailureStage::Shape => "shape",
        }
    }
}

/// Event emitted when an object is recorded as permanently failed.
pub struct ObjectFailed {
    pub stage: FailureStage,
}

impl InternalEvent for ObjectFailed {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Object failed");
        counter!("floe_objects_failed_total", "stage" => self.stage.as_str()).increment(1);
    }
}

/// Event emitted with the number of bundle entries counted in loaded bodies.
pub struct BundleRecords {
    pub count: u64,
}

impl InternalEvent for BundleRecords {
    fn emit(self) {
        trace!(count = self.count, "Bundle records");
        counter!("floe_bundle_records_total").increment(self.count);
    }
}

// ============================================================================
// Histogram events for timing
// ============================================================================

/// Event emitted when a single object body fetch completes.
pub struct FetchCompleted {
    pub duration: Duration,
}

impl InternalEvent for FetchCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Fetch completed");
        histogram!("floe_fetch_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a warehouse upsert completes.
pub struct UpsertCompleted {
    pub duration: Duration,
}

impl InternalEvent for UpsertCompleted {
    fn emit(self) {
        trace!(duration_ms = self.duration.as_millis(), "Upsert completed");
        histogram!("floe_upsert_duration_seconds").record(self.duration.as_secs_f64());
    }
}

// ============================================================================
// Gauge events for lag tracking
// ============================================================================

/// Event emitted after a watermark advance to track how far the watermark
/// trails wall-clock time.
pub struct WatermarkLag {
    pub seconds: f64,
}

impl InternalEvent for WatermarkLag {
    fn emit(self) {
        trace!(seconds = self.seconds, "Watermark lag");
        gauge!("floe_watermark_lag_seconds").set(self.seconds);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
    List,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
            StorageOperation::List => "list",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "floe_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "floe_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
