//! Dead letter queue for permanently skipped objects.
//!
//! The loader never lets one malformed object poison a batch: it records the
//! failure, advances past the object, and moves on. This module preserves
//! those failures as NDJSON records in a configurable storage location so
//! they can be inspected and requeued by hand.

mod queue;
mod types;

pub use queue::DeadLetterQueue;
pub use types::{FailedObject, FailureStats};
