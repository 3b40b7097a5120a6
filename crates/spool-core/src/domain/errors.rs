//! Error taxonomy for the pool engine.
//!
//! Two of these are normal control-flow outcomes, not faults:
//! - `QueueSaturated`: admission or dispatch capacity exhausted; the caller
//!   retries later.
//! - `Conflict`: a concurrent actor already mutated the targeted version;
//!   the current attempt is abandoned, never retried in place.

use thiserror::Error;

use super::ids::TaskId;

#[derive(Debug, Error)]
pub enum SpoolError {
    /// No admission token or no dispatch slot available.
    #[error("task queue is saturated")]
    QueueSaturated,

    /// Conditional update lost the race against another actor.
    #[error("optimistic lock conflict on task {0}")]
    Conflict(TaskId),

    /// Lookup of a non-existent task id.
    #[error("task {0} not found")]
    NotFound(TaskId),

    /// Any underlying persistence failure not covered above.
    #[error("store failure: {0}")]
    Store(String),
}

impl SpoolError {
    /// Expected-under-contention outcomes that must not be escalated as faults.
    pub fn is_benign(&self) -> bool {
        matches!(self, SpoolError::QueueSaturated | SpoolError::Conflict(_))
    }
}
