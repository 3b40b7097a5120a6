//! spool-sqlite
//!
//! SQLite-backed [`TaskStore`](spool_core::ports::TaskStore) implementation.
//! Conditional updates carry the version fence in the WHERE clause, so the
//! database itself arbitrates concurrent claimants.

pub mod store;

pub use store::SqliteTaskStore;
