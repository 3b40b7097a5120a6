//! Point-in-time engine status snapshot.

use serde::Serialize;

/// Observability view of the dispatch side of the engine.
///
/// `in_flight` counts ids in the tracking set: everything queued plus
/// everything currently claimed by a worker through the direct path.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolStatus {
    pub queued: usize,
    pub queue_capacity: usize,
    pub in_flight: usize,
}
