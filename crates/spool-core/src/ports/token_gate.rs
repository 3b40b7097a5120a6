//! TokenGate port - admission control for tasks alive in the system.
//!
//! A token is held from successful creation until the task's terminal
//! outcome, not merely until it is dequeued. Capacity therefore bounds total
//! in-flight work, independent of worker count and queue depth.
//!
//! The backing may be a process-local counter or a counter shared between
//! cooperating instances; the engine only needs this contract to hold with
//! serializable accounting (no two callers may consume the same permit).

use async_trait::async_trait;

use crate::domain::SpoolError;

#[async_trait]
pub trait TokenGate: Send + Sync {
    /// Take one permit. Fails with `SpoolError::QueueSaturated` when none
    /// remain; never blocks waiting for one.
    async fn acquire(&self) -> Result<(), SpoolError>;

    /// Return one permit. Always succeeds, and is safe to call even when the
    /// caller never observed a matching `acquire` (recovered tasks release a
    /// token their crashed creator paid for).
    async fn release(&self);

    /// Reset the gate to `capacity` available permits.
    async fn initialize(&self, capacity: usize);
}
