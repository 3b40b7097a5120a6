//! Executor port - the opaque work unit.
//!
//! The engine treats execution as "run to completion or fail": it only needs
//! the outcome, never the internals. No cancellation signal is threaded
//! through this contract; shutdown waits for in-flight executions up to a
//! deadline and reports a timeout instead of aborting them.

use async_trait::async_trait;

use crate::domain::Task;

/// Failure reported by the work unit. Drives the task record to `failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ExecFailure(pub String);

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<(), ExecFailure>;
}
