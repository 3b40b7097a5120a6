//! spool-redis
//!
//! Redis-backed [`TokenGate`](spool_core::ports::TokenGate) implementation.
//! Permits live in a Redis list shared by every cooperating instance, so the
//! admission bound holds across processes, not just within one.

pub mod gate;

pub use gate::RedisTokenGate;
