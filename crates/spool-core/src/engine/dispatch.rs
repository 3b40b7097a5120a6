//! Dispatch queue: a bounded in-memory FIFO of task references.
//!
//! Producers (ingress, recovery poller) never block: `try_enqueue` reports a
//! full queue as a normal backpressure signal. Consumers (workers) block in
//! `pop` until an item arrives or the queue is closed and drained.
//!
//! Design:
//! - `Mutex<VecDeque>` holds the items; `Notify` wakes blocked consumers.
//! - A `Notified` future is enabled while the state lock is still held, so a
//!   push or close between the emptiness check and the await cannot be lost.

use std::collections::VecDeque;
use std::pin::pin;

use tokio::sync::{Mutex, Notify};

use crate::domain::TaskId;

/// Transient queue entry: the task and the version the sender observed.
///
/// Carrying the version forward prevents a worker from blindly re-claiming a
/// task that another path has mutated since the snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchMessage {
    pub task_id: TaskId,
    pub expected_version: u32,
    /// True when the sender already transitioned the row to in_progress
    /// (`claim_batch`); the worker then skips its own claim.
    pub pre_claimed: bool,
}

impl DispatchMessage {
    /// Direct submission: the row is still pending, the worker claims it.
    pub fn fresh(task_id: TaskId, expected_version: u32) -> Self {
        Self {
            task_id,
            expected_version,
            pre_claimed: false,
        }
    }

    /// Poller-produced: the row is already in_progress at `expected_version`.
    pub fn claimed(task_id: TaskId, expected_version: u32) -> Self {
        Self {
            task_id,
            expected_version,
            pre_claimed: true,
        }
    }
}

struct QueueState {
    items: VecDeque<DispatchMessage>,
    closed: bool,
}

pub struct DispatchQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Non-blocking enqueue. `false` means full (or closing) - an expected
    /// backpressure outcome, not an error.
    pub async fn try_enqueue(&self, msg: DispatchMessage) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.closed || state.items.len() >= self.capacity {
                return false;
            }
            state.items.push_back(msg);
        }
        self.notify.notify_one();
        true
    }

    /// Dequeue, waiting while the queue is empty. Returns `None` once the
    /// queue is closed and fully drained.
    pub async fn pop(&self) -> Option<DispatchMessage> {
        loop {
            let mut notified = pin!(self.notify.notified());
            {
                let mut state = self.state.lock().await;
                if let Some(msg) = state.items.pop_front() {
                    return Some(msg);
                }
                if state.closed {
                    return None;
                }
                // Register for a wakeup before releasing the lock.
                notified.as_mut().enable();
            }
            notified.await;
        }
    }

    /// Close the queue: producers are refused, consumers drain what is left
    /// and then observe `None`.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock().await;
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn remaining_capacity(&self) -> usize {
        self.capacity - self.len().await
    }
}
