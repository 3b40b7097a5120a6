//! spool-server
//!
//! HTTP front end for the task pool: an axum router over
//! [`TaskIngress`](spool_core::TaskIngress), plus a per-client rate limit.

pub mod api;
pub mod ratelimit;
