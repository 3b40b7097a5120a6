//! SQLite TaskStore.
//!
//! Every conditional mutation is a single UPDATE whose WHERE clause carries
//! the `(id, version)` fence (plus a status predicate where the transition
//! requires one). Zero rows affected means another actor got there first.
//! `claim_batch` folds select-and-claim into one statement so two pollers
//! can never claim the same row.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use spool_core::domain::{SpoolError, Task, TaskId, TaskStatus};
use spool_core::ports::{Clock, SystemClock, TaskStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    description  TEXT NOT NULL,
    status       TEXT NOT NULL,
    version      INTEGER NOT NULL,
    created_at   TEXT NOT NULL,
    started_at   TEXT,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_tasks_status_created ON tasks (status, created_at);
";

pub struct SqliteTaskStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteTaskStore {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists.
    pub async fn connect(path: &str) -> Result<Self, SpoolError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(store_err)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(store_err)?;
        Self::with_pool(pool, Arc::new(SystemClock)).await
    }

    pub async fn with_pool(pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self, SpoolError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(store_err)?;
        debug!("task schema ready");
        Ok(Self { pool, clock })
    }
}

fn store_err(err: sqlx::Error) -> SpoolError {
    SpoolError::Store(err.to_string())
}

fn decode_task(row: &SqliteRow) -> Result<Task, SpoolError> {
    let id: String = row.try_get("id").map_err(store_err)?;
    let status: String = row.try_get("status").map_err(store_err)?;
    let version: i64 = row.try_get("version").map_err(store_err)?;
    Ok(Task {
        id: TaskId::from_str(&id).map_err(|e| SpoolError::Store(e.to_string()))?,
        title: row.try_get("title").map_err(store_err)?,
        description: row.try_get("description").map_err(store_err)?,
        status: TaskStatus::from_str(&status).map_err(|e| SpoolError::Store(e.to_string()))?,
        version: version
            .try_into()
            .map_err(|_| SpoolError::Store(format!("version out of range: {version}")))?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        started_at: row.try_get("started_at").map_err(store_err)?,
        completed_at: row.try_get("completed_at").map_err(store_err)?,
    })
}

impl SqliteTaskStore {
    /// Distinguish a vanished row from a lost version race after a
    /// zero-row conditional update.
    async fn fence_error(&self, id: TaskId) -> SpoolError {
        let exists = sqlx::query("SELECT 1 FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await;
        match exists {
            Ok(Some(_)) => SpoolError::Conflict(id),
            Ok(None) => SpoolError::NotFound(id),
            Err(err) => store_err(err),
        }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, title: &str, description: &str) -> Result<Task, SpoolError> {
        let task = Task::new(title, description, self.clock.now());
        sqlx::query(
            "INSERT INTO tasks (id, title, description, status, version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.version as i64)
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(task)
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Task, SpoolError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => decode_task(&row),
            None => Err(SpoolError::NotFound(id)),
        }
    }

    async fn list_all(&self) -> Result<Vec<Task>, SpoolError> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;
        rows.iter().map(decode_task).collect()
    }

    async fn claim_batch(
        &self,
        limit: usize,
        exclude: &[TaskId],
    ) -> Result<Vec<Task>, SpoolError> {
        // The exclusion list is small and bounded by the dispatch queue
        // capacity, so inline placeholders are fine.
        let mut sql = String::from(
            "UPDATE tasks
             SET status = 'in_progress', version = version + 1, started_at = ?
             WHERE id IN (
                 SELECT id FROM tasks WHERE status = 'pending'",
        );
        if !exclude.is_empty() {
            sql.push_str(" AND id NOT IN (");
            for i in 0..exclude.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
            }
            sql.push(')');
        }
        sql.push_str(
            " ORDER BY created_at ASC, id ASC LIMIT ?
             )
             RETURNING *",
        );

        let mut query = sqlx::query(&sql).bind(self.clock.now());
        for id in exclude {
            query = query.bind(id.to_string());
        }
        let rows = query
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        let mut claimed: Vec<Task> = rows
            .iter()
            .map(decode_task)
            .collect::<Result<_, _>>()?;
        // RETURNING order is unspecified; restore oldest-first.
        claimed.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(claimed)
    }

    async fn claim_one(&self, id: TaskId, expected_version: u32) -> Result<Task, SpoolError> {
        let row = sqlx::query(
            "UPDATE tasks
             SET status = 'in_progress', version = version + 1, started_at = ?1
             WHERE id = ?2 AND status = 'pending' AND version = ?3
             RETURNING *",
        )
        .bind(self.clock.now())
        .bind(id.to_string())
        .bind(expected_version as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match row {
            Some(row) => decode_task(&row),
            None => Err(self.fence_error(id).await),
        }
    }

    async fn complete(&self, id: TaskId, expected_version: u32) -> Result<(), SpoolError> {
        let result = sqlx::query(
            "UPDATE tasks
             SET status = 'completed', version = version + 1, completed_at = ?1
             WHERE id = ?2 AND version = ?3",
        )
        .bind(self.clock.now())
        .bind(id.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(self.fence_error(id).await);
        }
        Ok(())
    }

    async fn fail(&self, id: TaskId, expected_version: u32) -> Result<(), SpoolError> {
        let result = sqlx::query(
            "UPDATE tasks
             SET status = 'failed', version = version + 1
             WHERE id = ?1 AND version = ?2",
        )
        .bind(id.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(self.fence_error(id).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use spool_core::ports::FixedClock;

    use super::*;

    async fn memory_store() -> SqliteTaskStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        SqliteTaskStore::with_pool(pool, Arc::new(FixedClock::new(at)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn insert_then_find_round_trips_every_column() {
        let store = memory_store().await;
        let task = store.insert("title", "description").await.unwrap();

        let found = store.find_by_id(task.id).await.unwrap();
        assert_eq!(found, task);
        assert_eq!(found.status, TaskStatus::Pending);
        assert_eq!(found.version, 1);
        assert!(found.started_at.is_none());
        assert!(found.completed_at.is_none());
    }

    #[tokio::test]
    async fn find_unknown_id_is_not_found() {
        let store = memory_store().await;
        let id = TaskId::generate();
        assert!(matches!(
            store.find_by_id(id).await,
            Err(SpoolError::NotFound(got)) if got == id
        ));
    }

    #[tokio::test]
    async fn claim_batch_claims_pending_rows_once() {
        let store = memory_store().await;
        let a = store.insert("a", "d").await.unwrap();
        let b = store.insert("b", "d").await.unwrap();

        let claimed = store.claim_batch(10, &[]).await.unwrap();
        assert_eq!(claimed.len(), 2);
        for task in &claimed {
            assert_eq!(task.status, TaskStatus::InProgress);
            assert_eq!(task.version, 2);
            assert!(task.started_at.is_some());
        }
        // Fixed clock means equal created_at for both rows; the id
        // tie-break keeps the order deterministic.
        let mut expected = vec![a.id, b.id];
        expected.sort();
        let got: Vec<TaskId> = claimed.iter().map(|t| t.id).collect();
        assert_eq!(got, expected);

        assert!(store.claim_batch(10, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_batch_skips_excluded_ids() {
        let store = memory_store().await;
        let queued = store.insert("queued", "d").await.unwrap();
        let orphan = store.insert("orphan", "d").await.unwrap();

        let claimed = store.claim_batch(10, &[queued.id]).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, orphan.id);

        // The excluded row is untouched and still claimable by its own
        // worker at the original version.
        let row = store.find_by_id(queued.id).await.unwrap();
        assert_eq!(row.status, TaskStatus::Pending);
        assert_eq!(row.version, 1);
        let won = store.claim_one(queued.id, 1).await.unwrap();
        assert_eq!(won.version, 2);
    }

    #[tokio::test]
    async fn claim_batch_respects_the_limit() {
        let store = memory_store().await;
        for i in 0..5 {
            store.insert(&format!("t{i}"), "d").await.unwrap();
        }

        assert_eq!(store.claim_batch(2, &[]).await.unwrap().len(), 2);
        assert_eq!(store.claim_batch(10, &[]).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn claim_one_wins_once_then_conflicts() {
        let store = memory_store().await;
        let task = store.insert("t", "d").await.unwrap();

        let claimed = store.claim_one(task.id, 1).await.unwrap();
        assert_eq!(claimed.status, TaskStatus::InProgress);
        assert_eq!(claimed.version, 2);

        assert!(matches!(
            store.claim_one(task.id, 1).await,
            Err(SpoolError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn claim_one_on_missing_row_is_not_found() {
        let store = memory_store().await;
        let id = TaskId::generate();
        assert!(matches!(
            store.claim_one(id, 1).await,
            Err(SpoolError::NotFound(got)) if got == id
        ));
    }

    #[tokio::test]
    async fn full_protocol_reaches_completed_at_version_three() {
        let store = memory_store().await;
        let task = store.insert("t", "d").await.unwrap();

        let claimed = store.claim_one(task.id, task.version).await.unwrap();
        store.complete(task.id, claimed.version).await.unwrap();

        let done = store.find_by_id(task.id).await.unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.version, 3);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn stale_complete_conflicts_and_leaves_the_row_untouched() {
        let store = memory_store().await;
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
    async fn fail_marks_the_row_with_the_same_fence() {
        let store = memory_store().await;
        let task = store.insert("t", "d").await.unwrap();

        store.fail(task.id, 1).await.unwrap();
        let row = store.find_by_id(task.id).await.unwrap();
        assert_eq!(row.status, TaskStatus::Failed);
        assert_eq!(row.version, 2);
        assert!(row.completed_at.is_none());

        assert!(matches!(
            store.fail(task.id, 1).await,
            Err(SpoolError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn list_all_returns_newest_first() {
        let store = memory_store().await;
        let a = store.insert("a", "d").await.unwrap();
        let b = store.insert("b", "d").await.unwrap();

        let ids: Vec<TaskId> = store.list_all().await.unwrap().iter().map(|t| t.id).collect();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        expected.reverse();
        assert_eq!(ids, expected);
    }
}
