//! In-memory TaskStore.
//!
//! Development and test implementation. The whole map lives behind one
//! async mutex, so every operation - in particular the select-and-claim in
//! `claim_batch` - is trivially atomic with respect to concurrent callers,
//! which is exactly the contract a transactional store provides with
//! conditional updates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{SpoolError, Task, TaskId, TaskStatus};
use crate::ports::{Clock, SystemClock, TaskStore};

pub struct MemoryTaskStore {
    records: Mutex<HashMap<TaskId, Task>>,
    clock: Arc<dyn Clock>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Test hook: overwrite a record in place, bypassing the version fence.
    /// Used to fabricate crash leftovers (e.g. pending rows nobody enqueued).
    pub async fn put_raw(&self, task: Task) {
        let mut records = self.records.lock().await;
        records.insert(task.id, task);
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Transition a claimed row in place: pending -> in_progress, version+1.
fn apply_claim(task: &mut Task, now: DateTime<Utc>) {
    task.status = TaskStatus::InProgress;
    task.started_at = Some(now);
    task.version += 1;
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, title: &str, description: &str) -> Result<Task, SpoolError> {
        let task = Task::new(title, description, self.clock.now());
        let mut records = self.records.lock().await;
        records.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Task, SpoolError> {
        let records = self.records.lock().await;
        records.get(&id).cloned().ok_or(SpoolError::NotFound(id))
    }

    async fn list_all(&self) -> Result<Vec<Task>, SpoolError> {
        let records = self.records.lock().await;
        let mut tasks: Vec<Task> = records.values().cloned().collect();
        // Newest first; id breaks created_at ties deterministically.
        tasks.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(tasks)
    }

    async fn claim_batch(
        &self,
        limit: usize,
        exclude: &[TaskId],
    ) -> Result<Vec<Task>, SpoolError> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;

        let mut pending: Vec<(DateTime<Utc>, TaskId)> = records
            .values()
            .filter(|t| t.status == TaskStatus::Pending && !exclude.contains(&t.id))
            .map(|t| (t.created_at, t.id))
            .collect();
        pending.sort();

        let mut claimed = Vec::new();
        for (_, id) in pending.into_iter().take(limit) {
            if let Some(task) = records.get_mut(&id) {
                apply_claim(task, now);
                claimed.push(task.clone());
            }
        }
        Ok(claimed)
    }

    async fn claim_one(&self, id: TaskId, expected_version: u32) -> Result<Task, SpoolError> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let task = records.get_mut(&id).ok_or(SpoolError::NotFound(id))?;
        if task.version != expected_version || task.status != TaskStatus::Pending {
            return Err(SpoolError::Conflict(id));
        }
        apply_claim(task, now);
        Ok(task.clone())
    }

    async fn complete(&self, id: TaskId, expected_version: u32) -> Result<(), SpoolError> {
        let now = self.clock.now();
        let mut records = self.records.lock().await;
        let task = records.get_mut(&id).ok_or(SpoolError::NotFound(id))?;
        if task.version != expected_version {
            return Err(SpoolError::Conflict(id));
        }
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        task.version += 1;
        Ok(())
    }

    async fn fail(&self, id: TaskId, expected_version: u32) -> Result<(), SpoolError> {
        let mut records = self.records.lock().await;
        let task = records.get_mut(&id).ok_or(SpoolError::NotFound(id))?;
        if task.version != expected_version {
            return Err(SpoolError::Conflict(id));
        }
        task.status = TaskStatus::Failed;
        task.version += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::ports::FixedClock;

    fn fixed_store() -> (MemoryTaskStore, DateTime<Utc>) {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        (
            MemoryTaskStore::with_clock(Arc::new(FixedClock::new(at))),
            at,
        )
    }

    /// Clock that advances one second per call, for ordering assertions.
    struct StepClock(std::sync::atomic::AtomicI64);

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            let step = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(step)
        }
    }

    #[tokio::test]
    async fn insert_then_find() {
        let (store, at) = fixed_store();
        let task = store.insert("t", "d").await.unwrap();

        let found = store.find_by_id(task.id).await.unwrap();
        assert_eq!(found, task);
        assert_eq!(found.status, TaskStatus::Pending);
        assert_eq!(found.version, 1);
        assert_eq!(found.created_at, at);
    }

    #[tokio::test]
    async fn find_unknown_id_is_not_found() {
        let (store, _) = fixed_store();
        let id = TaskId::generate();
        assert!(matches!(
            store.find_by_id(id).await,
            Err(SpoolError::NotFound(got)) if got == id
        ));
    }

    #[tokio::test]
    async fn list_all_is_newest_first() {
        // Pinned clock: every row shares created_at, so ordering falls back
        // to the deterministic id tie-break.
        let (store, _) = fixed_store();
        let a = store.insert("a", "d").await.unwrap();
        let b = store.insert("b", "d").await.unwrap();
        let c = store.insert("c", "d").await.unwrap();

        let ids: Vec<TaskId> = store.list_all().await.unwrap().iter().map(|t| t.id).collect();
        let mut expected = vec![a.id, b.id, c.id];
        expected.sort();
        expected.reverse();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn claim_batch_takes_oldest_pending_first() {
        let store =
            MemoryTaskStore::with_clock(Arc::new(StepClock(std::sync::atomic::AtomicI64::new(0))));
        let first = store.insert("first", "d").await.unwrap();
        let second = store.insert("second", "d").await.unwrap();
        store.insert("third", "d").await.unwrap();

        let claimed = store.claim_batch(2, &[]).await.unwrap();
        let ids: Vec<TaskId> = claimed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        for task in &claimed {
            assert_eq!(task.status, TaskStatus::InProgress);
            assert_eq!(task.version, 2);
            assert!(task.started_at.is_some());
        }

        // Already-claimed rows are not selected again.
        let rest = store.claim_batch(10, &[]).await.unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[tokio::test]
    async fn claim_batch_leaves_excluded_ids_pending() {
        let (store, _) = fixed_store();
        let queued = store.insert("queued", "d").await.unwrap();
        let orphan = store.insert("orphan", "d").await.unwrap();

        let claimed = store.claim_batch(10, &[queued.id]).await.unwrap();
        let ids: Vec<TaskId> = claimed.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![orphan.id]);

        // The excluded row is untouched and claimable later.
        let row = store.find_by_id(queued.id).await.unwrap();
        assert_eq!(row.status, TaskStatus::Pending);
        assert_eq!(row.version, 1);
        assert_eq!(store.claim_batch(10, &[]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_one_enforces_the_version_fence() {
        let store = MemoryTaskStore::new();
        let task = store.insert("t", "d").await.unwrap();

        let claimed = store.claim_one(task.id, 1).await.unwrap();
        assert_eq!(claimed.version, 2);
        assert_eq!(claimed.status, TaskStatus::InProgress);

        // Same stale version: exactly one claimant may ever win.
        assert!(matches!(
            store.claim_one(task.id, 1).await,
            Err(SpoolError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn complete_bumps_version_and_sets_timestamp() {
        let (store, at) = fixed_store();
        let task = store.insert("t", "d").await.unwrap();
        let claimed = store.claim_one(task.id, 1).await.unwrap();

        store.complete(task.id, claimed.version).await.unwrap();

        let done = store.find_by_id(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.version, 3);
        assert_eq!(done.completed_at, Some(at));
    }

    #[tokio::test]
    async fn complete_with_stale_version_conflicts_and_leaves_row_untouched() {
        let store = MemoryTaskStore::new();
        let task = store.insert("t", "d").await.unwrap();
        let claimed = store.claim_one(task.id, 1).await.unwrap();
        store.complete(task.id, claimed.version).await.unwrap();

        assert!(matches!(
            store.complete(task.id, claimed.version).await,
            Err(SpoolError::Conflict(_))
        ));
        let row = store.find_by_id(task.id).await.unwrap();
        assert_eq!(row.status, TaskStatus::Completed);
        assert_eq!(row.version, 3);
    }

    #[tokio::test]
    async fn fail_uses_the_same_fence() {
        let store = MemoryTaskStore::new();
        let task = store.insert("t", "d").await.unwrap();

        store.fail(task.id, 1).await.unwrap();
        let row = store.find_by_id(task.id).await.unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert_eq!(row.version, 2);

        assert!(matches!(
            store.fail(task.id, 1).await,
            Err(SpoolError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_claimants_on_one_version_yield_a_single_winner() {
        let store = Arc::new(MemoryTaskStore::new());
        let task = store.insert("t", "d").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let id = task.id;
            handles.push(tokio::spawn(async move { store.claim_one(id, 1).await }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(SpoolError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
    }
}
