//! The task pool engine.
//!
//! Components, leaves first:
//! - `dispatch`: bounded FIFO of `(task_id, expected_version)` references.
//! - `inflight`: duplicate-dispatch guard shared by ingress and the poller.
//! - `worker`: N claim -> execute -> complete loops.
//! - `poller`: periodic recovery of undispatched pending rows.
//! - `ingress`: token-gated creation with compensating rollback.
//! - `status`: observability snapshot.
//!
//! [`TaskPool`] wires them and owns the shutdown sequence.

pub mod dispatch;
pub mod inflight;
pub mod ingress;
pub mod poller;
pub mod status;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use self::dispatch::{DispatchMessage, DispatchQueue};
use self::inflight::InflightSet;
use self::poller::RecoveryPoller;
use self::worker::{WorkerContext, WorkerGroup};
use crate::ports::{Executor, TaskStore, TokenGate};

pub use self::ingress::TaskIngress;
pub use self::status::PoolStatus;

/// Sizing knobs for one pool instance. Validation (everything > 0) belongs to
/// whatever loads configuration; the engine takes these as given.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub poll_interval: Duration,
    pub poll_batch_size: usize,
}

/// How the bounded worker drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean,
    /// The deadline elapsed first. Workers mid-execution keep running,
    /// detached; the execution contract has no cancellation signal.
    TimedOut,
}

/// Outcome of a track-then-enqueue submission attempt.
pub(crate) enum TrackedEnqueue {
    Accepted,
    AlreadyInFlight,
    QueueFull,
}

/// Submit a message unless its task is already in flight. On a full queue
/// the tracking entry is rolled back so the task stays eligible later.
pub(crate) async fn enqueue_tracked(
    queue: &DispatchQueue,
    inflight: &InflightSet,
    msg: DispatchMessage,
) -> TrackedEnqueue {
    if !inflight.track(msg.task_id).await {
        return TrackedEnqueue::AlreadyInFlight;
    }
    if queue.try_enqueue(msg).await {
        TrackedEnqueue::Accepted
    } else {
        inflight.untrack(msg.task_id).await;
        TrackedEnqueue::QueueFull
    }
}

/// A running pool: dispatch queue, worker group, and recovery poller wired
/// over the store, gate, and executor the caller provides.
pub struct TaskPool {
    ingress: TaskIngress,
    workers: WorkerGroup,
    poller_handle: JoinHandle<()>,
    poller_stop: watch::Sender<bool>,
    queue: Arc<DispatchQueue>,
}

impl TaskPool {
    pub fn start(
        config: PoolConfig,
        store: Arc<dyn TaskStore>,
        gate: Arc<dyn TokenGate>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let queue = Arc::new(DispatchQueue::new(config.queue_capacity));
        let inflight = Arc::new(InflightSet::new());

        let (poller_stop, stop_rx) = watch::channel(false);
        let poller_handle = RecoveryPoller::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&inflight),
            config.poll_interval,
            config.poll_batch_size,
        )
        .spawn(stop_rx);

        let workers = WorkerGroup::spawn(
            config.workers,
            WorkerContext {
                store: Arc::clone(&store),
                gate: Arc::clone(&gate),
                executor,
                queue: Arc::clone(&queue),
                inflight: Arc::clone(&inflight),
            },
        );

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "task pool started"
        );

        let ingress = TaskIngress::new(store, gate, Arc::clone(&queue), inflight);
        Self {
            ingress,
            workers,
            poller_handle,
            poller_stop,
            queue,
        }
    }

    /// Cloneable front door for submission and lookups.
    pub fn ingress(&self) -> TaskIngress {
        self.ingress.clone()
    }

    /// Cooperative shutdown:
    /// 1. stop the poller and wait for its full exit (no more recovery
    ///    enqueues),
    /// 2. close the dispatch queue (workers drain, then see no-more-items),
    /// 3. wait for the workers, bounded by `deadline`.
    pub async fn shutdown(self, deadline: Duration) -> ShutdownOutcome {
        let _ = self.poller_stop.send(true);
        let _ = self.poller_handle.await;

        self.queue.close().await;

        match tokio::time::timeout(deadline, self.workers.join_all()).await {
            Ok(()) => {
                info!("worker pool shut down cleanly");
                ShutdownOutcome::Clean
            }
            Err(_) => {
                warn!("worker pool shutdown timed out; in-flight executions left running");
                ShutdownOutcome::TimedOut
            }
        }
    }
}
