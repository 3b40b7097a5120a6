//! spool-core
//!
//! Store-agnostic task pool engine.
//!
//! # Module layout
//! - **domain**: the task model (ids, status, task, errors)
//! - **ports**: abstraction seams (TaskStore, TokenGate, Executor, Clock)
//! - **engine**: the pool itself (dispatch queue, workers, recovery poller,
//!   ingress, shutdown)
//! - **impls**: in-process implementations (MemoryTaskStore, LocalTokenGate,
//!   simulated executors)
//!
//! A caller builds a [`TaskPool`] from a store, an admission gate, and an
//! executor, then talks to it through [`TaskIngress`].

pub mod domain;
pub mod engine;
pub mod impls;
pub mod ports;

pub use domain::{SpoolError, Task, TaskId, TaskStatus};
pub use engine::{PoolConfig, PoolStatus, ShutdownOutcome, TaskIngress, TaskPool};
