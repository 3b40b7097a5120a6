//! In-process implementations of the ports.
//!
//! Production-grade external implementations live in sibling crates
//! (`spool-sqlite` for the task store). What ships here:
//! - `MemoryTaskStore`: development/test store with conditional-update
//!   semantics.
//! - `LocalTokenGate`: single-instance admission counter.
//! - `SimulatedExecutor` / `NoopExecutor`: stand-in work units.

pub mod executors;
pub mod local_gate;
pub mod memory_store;

pub use self::executors::{NoopExecutor, SimulatedExecutor};
pub use self::local_gate::LocalTokenGate;
pub use self::memory_store::MemoryTaskStore;
