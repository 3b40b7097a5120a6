//! Ports - the engine's trait seams.
//!
//! Each trait hides an external collaborator behind an interface:
//! - `TaskStore`: the durable, conditionally-updatable record store.
//! - `TokenGate`: the admission permit counter (local or shared).
//! - `Executor`: the opaque work unit.
//! - `Clock`: time, swappable for tests.

pub mod clock;
pub mod executor;
pub mod task_store;
pub mod token_gate;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::{ExecFailure, Executor};
pub use self::task_store::TaskStore;
pub use self::token_gate::TokenGate;
