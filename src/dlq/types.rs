//! DLQ types for failure tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::events::FailureStage;

/// A record of an object the loader permanently skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedObject {
    /// Source object key that failed.
    pub key: String,
    /// Error message describing the failure.
    pub error: String,
    /// Stage at which the failure occurred.
    pub stage: FailureStage,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Failure counts by stage.
#[derive(Debug, Clone, Default)]
pub struct FailureStats {
    pub parse: usize,
    pub shape: usize,
}

impl FailureStats {
    /// Increment the count for a stage.
    pub fn increment(&mut self, stage: FailureStage) {
        match stage {
            FailureStage::Parse => self.parse += 1,
            FailureStage::Shape => self.shape += 1,
        }
    }

    /// Total failure count across stages.
    pub fn total(&self) -> usize {
        self.parse + self.shape
    }
}
