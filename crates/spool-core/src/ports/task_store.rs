//! TaskStore port - the durable source of truth for task records.
//!
//! Design principles:
//! - The store is the sole synchronization point for task state. Correctness
//!   under concurrent workers, pollers, and instances relies entirely on the
//!   store's own conditional-update atomicity, never on engine-side locks.
//! - Every successful mutation bumps `version` by exactly 1. A conditional
//!   mutation against a stale `(id, expected_version)` pair affects zero rows
//!   and maps to `SpoolError::Conflict`.
//! - Records are never deleted by the engine.

use async_trait::async_trait;

use crate::domain::{SpoolError, Task, TaskId};

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a fresh record: status=pending, version=1, created_at=now.
    async fn insert(&self, title: &str, description: &str) -> Result<Task, SpoolError>;

    /// Fetch one record. `SpoolError::NotFound` when the id does not exist.
    async fn find_by_id(&self, id: TaskId) -> Result<Task, SpoolError>;

    /// Read-only listing, newest-created first. No claim semantics.
    async fn list_all(&self) -> Result<Vec<Task>, SpoolError>;

    /// Atomically select up to `limit` pending rows (oldest-created first,
    /// skipping any id in `exclude`), transition each to in_progress
    /// (version+1, started_at=now) in the same atomic step, and return the
    /// post-transition rows.
    ///
    /// The select-and-claim must be a single atomic operation. A separate
    /// select-then-update would let two concurrent pollers claim the same row.
    /// `exclude` carries the caller's in-flight ids: a pending row with a
    /// dispatch message already queued must stay pending for that message's
    /// worker, not be claimed out from under it.
    async fn claim_batch(&self, limit: usize, exclude: &[TaskId])
        -> Result<Vec<Task>, SpoolError>;

    /// Conditionally claim one pending row: requires `version ==
    /// expected_version` and status=pending; on success sets in_progress,
    /// started_at=now, version+1 and returns the post-transition row.
    ///
    /// Used by workers for directly-submitted dispatch messages, which carry
    /// the version the submitter observed.
    async fn claim_one(&self, id: TaskId, expected_version: u32) -> Result<Task, SpoolError>;

    /// Conditional completion: requires `version == expected_version`; on
    /// success sets status=completed, completed_at=now, version+1.
    ///
    /// Zero rows affected means another actor already mutated the row; the
    /// caller abandons the attempt (the row's current owner is responsible
    /// for it, not this caller).
    async fn complete(&self, id: TaskId, expected_version: u32) -> Result<(), SpoolError>;

    /// Conditional failure marking, same fence as [`TaskStore::complete`].
    async fn fail(&self, id: TaskId, expected_version: u32) -> Result<(), SpoolError>;
}
