//! Task ingress: token-gated creation with compensating rollback.
//!
//! The one non-trivial orchestration outside the pool itself:
//! acquire -> insert -> enqueue, unwinding on whichever step fails.
//! - acquire rejected: no store write at all, caller sees saturation.
//! - insert failed: token released, store error propagated.
//! - enqueue rejected (queue full): record marked failed (best effort),
//!   token released, caller sees saturation.
//! - already dispatched by recovery: no unwinding, the task is in flight and
//!   returned as created.

use std::sync::Arc;

use tracing::{debug, info};

use super::dispatch::{DispatchMessage, DispatchQueue};
use super::inflight::InflightSet;
use super::status::PoolStatus;
use super::{TrackedEnqueue, enqueue_tracked};
use crate::domain::{SpoolError, Task, TaskId};
use crate::ports::{TaskStore, TokenGate};

/// Front door of the engine. Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct TaskIngress {
    store: Arc<dyn TaskStore>,
    gate: Arc<dyn TokenGate>,
    queue: Arc<DispatchQueue>,
    inflight: Arc<InflightSet>,
}

impl TaskIngress {
    pub(crate) fn new(
        store: Arc<dyn TaskStore>,
        gate: Arc<dyn TokenGate>,
        queue: Arc<DispatchQueue>,
        inflight: Arc<InflightSet>,
    ) -> Self {
        Self {
            store,
            gate,
            queue,
            inflight,
        }
    }

    /// Create a task and submit it for processing.
    ///
    /// Returns the record as created (still pending, version 1); callers
    /// observe eventual progress via [`TaskIngress::get_task`].
    pub async fn create_task(&self, title: &str, description: &str) -> Result<Task, SpoolError> {
        self.gate.acquire().await?;

        let task = match self.store.insert(title, description).await {
            Ok(task) => task,
            Err(err) => {
                self.gate.release().await;
                return Err(err);
            }
        };

        let msg = DispatchMessage::fresh(task.id, task.version);
        match enqueue_tracked(&self.queue, &self.inflight, msg).await {
            TrackedEnqueue::Accepted => {
                info!(task_id = %task.id, "task created and dispatched");
                Ok(task)
            }
            TrackedEnqueue::AlreadyInFlight => {
                // Recovery claimed and dispatched the row in the window
                // between insert and enqueue. The task is being processed;
                // its message's worker owns the token release.
                debug!(task_id = %task.id, "task picked up by recovery before direct dispatch");
                Ok(task)
            }
            TrackedEnqueue::QueueFull => {
                // Best-effort: the record stays behind as failed so the
                // rejection is visible; saturation is what the caller sees.
                if let Err(err) = self.store.fail(task.id, task.version).await {
                    debug!(task_id = %task.id, error = %err, "could not mark rejected task failed");
                }
                self.gate.release().await;
                Err(SpoolError::QueueSaturated)
            }
        }
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, SpoolError> {
        self.store.find_by_id(id).await
    }

    /// All records, newest-created first.
    pub async fn list_tasks(&self) -> Result<Vec<Task>, SpoolError> {
        self.store.list_all().await
    }

    /// Point-in-time snapshot of queue depth and tracked in-flight work.
    pub async fn status(&self) -> PoolStatus {
        PoolStatus {
            queued: self.queue.len().await,
            queue_capacity: self.queue.capacity(),
            in_flight: self.inflight.len().await,
        }
    }
}
