//! In-flight tracking set.
//!
//! Ephemeral set of task ids currently in the dispatch queue or being
//! processed. Keeps the recovery poller and direct submission from
//! double-enqueuing the same task. This is a process-local aid against
//! duplicate dispatch, not a substitute for the store's conditional-update
//! guarantee.

use std::collections::HashSet;

use tokio::sync::Mutex;

use crate::domain::TaskId;

#[derive(Default)]
pub struct InflightSet {
    set: Mutex<HashSet<TaskId>>,
}

impl InflightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id`. Returns `false` when it was already tracked.
    pub async fn track(&self, id: TaskId) -> bool {
        self.set.lock().await.insert(id)
    }

    pub async fn untrack(&self, id: TaskId) {
        self.set.lock().await.remove(&id);
    }

    pub async fn contains(&self, id: TaskId) -> bool {
        self.set.lock().await.contains(&id)
    }

    /// Copy of the currently tracked ids, in no particular order.
    pub async fn snapshot(&self) -> Vec<TaskId> {
        self.set.lock().await.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.set.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.set.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn track_is_first_wins() {
        let set = InflightSet::new();
        let id = TaskId::generate();
        assert!(set.track(id).await);
        assert!(!set.track(id).await);
        assert!(set.contains(id).await);
    }

    #[tokio::test]
    async fn snapshot_lists_tracked_ids() {
        let set = InflightSet::new();
        let a = TaskId::generate();
        let b = TaskId::generate();
        set.track(a).await;
        set.track(b).await;

        let mut ids = set.snapshot().await;
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn untrack_allows_retracking() {
        let set = InflightSet::new();
        let id = TaskId::generate();
        assert!(set.track(id).await);
        set.untrack(id).await;
        assert!(!set.contains(id).await);
        assert!(set.track(id).await);
        assert_eq!(set.len().await, 1);
    }
}
