//! The durable task record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::status::TaskStatus;

/// A unit of work with a durable record and a lifecycle status.
///
/// Design:
/// - The store is the single source of truth for this record; everything in
///   the engine passes snapshots around by value.
/// - `version` starts at 1 and is bumped by exactly 1 on every successful
///   store mutation. A mutation keyed on a stale `(id, version)` pair affects
///   zero rows and leaves the record untouched (optimistic fence).
/// - `title` and `description` are opaque payload, immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Fresh pending record as inserted by ingress.
    pub fn new(title: &str, description: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: TaskId::generate(),
            title: title.to_string(),
            description: description.to_string(),
            status: TaskStatus::Pending,
            version: 1,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}
