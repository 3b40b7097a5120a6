//! Worker pool: N independent claim -> execute -> complete loops.
//!
//! Each worker blocks only while waiting for a dispatch message; every store
//! step is fenced by the record version, so workers never take engine-level
//! locks around execution. Conflicts are abandoned without retry - whoever
//! won the race owns the row now.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dispatch::{DispatchMessage, DispatchQueue};
use super::inflight::InflightSet;
use crate::domain::{SpoolError, Task};
use crate::ports::{Executor, TaskStore, TokenGate};

/// Shared collaborators handed to every worker.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub store: Arc<dyn TaskStore>,
    pub gate: Arc<dyn TokenGate>,
    pub executor: Arc<dyn Executor>,
    pub queue: Arc<DispatchQueue>,
    pub inflight: Arc<InflightSet>,
}

/// Handle for the spawned workers. Workers exit when the dispatch queue is
/// closed and drained; `join_all` waits for that.
pub struct WorkerGroup {
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub(crate) fn spawn(n: usize, ctx: WorkerContext) -> Self {
        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let ctx = ctx.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, ctx).await;
            }));
        }
        Self { joins }
    }

    pub(crate) async fn join_all(self) {
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(worker_id: usize, ctx: WorkerContext) {
    debug!(worker_id, "worker started");
    while let Some(msg) = ctx.queue.pop().await {
        handle_message(worker_id, &ctx, msg).await;
    }
    debug!(worker_id, "worker stopped");
}

/// Process one message. Token release and in-flight untracking happen
/// unconditionally, regardless of which protocol step aborted.
async fn handle_message(worker_id: usize, ctx: &WorkerContext, msg: DispatchMessage) {
    run_protocol(worker_id, ctx, msg).await;
    ctx.inflight.untrack(msg.task_id).await;
    ctx.gate.release().await;
}

async fn run_protocol(worker_id: usize, ctx: &WorkerContext, msg: DispatchMessage) {
    let task = match take_ownership(ctx, &msg).await {
        Ok(task) => task,
        Err(err) if err.is_benign() => {
            debug!(worker_id, task_id = %msg.task_id, "lost claim race, abandoning message");
            return;
        }
        Err(err) => {
            warn!(worker_id, task_id = %msg.task_id, error = %err, "claim step failed");
            return;
        }
    };

    debug!(worker_id, task_id = %task.id, "processing task");

    match ctx.executor.execute(&task).await {
        Ok(()) => match ctx.store.complete(task.id, task.version).await {
            Ok(()) => info!(worker_id, task_id = %task.id, "task completed"),
            Err(SpoolError::Conflict(_)) => {
                debug!(worker_id, task_id = %task.id, "task already settled elsewhere");
            }
            Err(err) => {
                warn!(worker_id, task_id = %task.id, error = %err, "failed to complete task");
            }
        },
        Err(failure) => {
            info!(worker_id, task_id = %task.id, error = %failure, "task execution failed");
            match ctx.store.fail(task.id, task.version).await {
                Ok(()) | Err(SpoolError::Conflict(_)) => {}
                Err(err) => {
                    warn!(worker_id, task_id = %task.id, error = %err, "failed to mark task failed");
                }
            }
        }
    }
}

/// Resolve the message into an owned in_progress row.
///
/// Fresh messages carry the submitter's version snapshot; the worker performs
/// the conditional claim itself. Pre-claimed messages reference a row the
/// poller already transitioned - only the version snapshot is re-verified.
async fn take_ownership(ctx: &WorkerContext, msg: &DispatchMessage) -> Result<Task, SpoolError> {
    if msg.pre_claimed {
        let task = ctx.store.find_by_id(msg.task_id).await?;
        if task.version != msg.expected_version {
            return Err(SpoolError::Conflict(msg.task_id));
        }
        Ok(task)
    } else {
        ctx.store.claim_one(msg.task_id, msg.expected_version).await
    }
}
