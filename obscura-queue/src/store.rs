//! SQLite-backed upload queue — the durable table of upload tasks.
//!
//! `claim_pending` is the sole synchronization point between concurrent
//! drain drivers: selecting claimable rows and marking them `IN_PROGRESS`
//! happens inside one transaction, so two drains can never pick up the
//! same task.

use crate::{QueueError, QueueResult};
use chrono::{DateTime, TimeZone, Utc};
use obscura_types::{
    FileId, FolderId, MediaType, NewUploadTask, QueueSummary, TaskId, TaskStatus, UploadTask,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

const TASK_COLUMNS: &str = "id, file_id, status, progress, attempt_count, max_attempts, \
     media_type, folder_id, created_at, last_attempt_at, next_retry_at, completed_at, \
     error_message, uploaded_url";

/// Durable queue of upload tasks.
#[derive(Clone)]
pub struct UploadQueue {
    conn: Arc<Mutex<Connection>>,
}

impl UploadQueue {
    /// Opens or creates a queue database at the given path.
    pub fn open(path: &Path) -> QueueResult<Self> {
        let conn = Connection::open(path)?;
        // WAL keeps claim transactions cheap under concurrent drains.
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        initialize_schema(&conn)?;

        // Rows left IN_PROGRESS by a dead process go back to PENDING so
        // the next drain can pick them up. Attempt counters are untouched:
        // an unresolved attempt never counts.
        let recovered = conn.execute(
            "UPDATE upload_tasks SET status = 'PENDING' WHERE status = 'IN_PROGRESS'",
            [],
        )?;
        if recovered > 0 {
            debug!("recovered {recovered} in-flight task(s) from previous process");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory queue (for testing).
    pub fn open_in_memory() -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Enqueues an upload task, assigning a fresh task id.
    ///
    /// Idempotent with respect to the file: if a task for the same
    /// `file_id` is still `PENDING` or `IN_PROGRESS`, that task is
    /// returned unchanged instead of inserting a duplicate.
    pub fn enqueue(&self, new: NewUploadTask, now: DateTime<Utc>) -> QueueResult<UploadTask> {
        let conn = self.conn.lock().unwrap();

        let existing = conn
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM upload_tasks \
                     WHERE file_id = ?1 AND status IN ('PENDING', 'IN_PROGRESS') \
                     ORDER BY created_at ASC LIMIT 1"
                ),
                params![new.file_id.to_string()],
                row_to_task,
            )
            .optional()?;
        if let Some(task) = existing {
            debug!("file {} already has active task {}", new.file_id, task.id);
            return Ok(task);
        }

        let task = UploadTask {
            id: TaskId::new(),
            file_id: new.file_id,
            status: TaskStatus::Pending,
            progress: 0.0,
            attempt_count: 0,
            max_attempts: new.max_attempts,
            media_type: new.media_type,
            folder_id: new.folder_id,
            created_at: now,
            last_attempt_at: None,
            next_retry_at: None,
            completed_at: None,
            error_message: None,
            uploaded_url: None,
        };

        conn.execute(
            "INSERT OR REPLACE INTO upload_tasks (
                id, file_id, status, progress, attempt_count, max_attempts,
                media_type, folder_id, created_at, last_attempt_at, next_retry_at,
                completed_at, error_message, uploaded_url
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                task.id.to_string(),
                task.file_id.to_string(),
                task.status.as_str(),
                task.progress,
                task.attempt_count as i64,
                task.max_attempts as i64,
                task.media_type.as_str(),
                task.folder_id.map(|f| f.to_string()),
                to_millis(task.created_at),
                Option::<i64>::None,
                Option::<i64>::None,
                Option::<i64>::None,
                Option::<String>::None,
                Option::<String>::None,
            ],
        )?;

        debug!("enqueued task {} for file {}", task.id, task.file_id);
        Ok(task)
    }

    /// Atomically claims tasks that are due for an upload attempt.
    ///
    /// A task is claimable when it has attempts left and either is
    /// `PENDING` (fresh, or reset for manual retry) or is `FAILED` with a
    /// scheduled retry time that has passed. A `FAILED` row with no
    /// scheduled retry is terminal and is never picked up again.
    /// Claimed rows are marked `IN_PROGRESS` in the same transaction.
    pub fn claim_pending(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> QueueResult<Vec<UploadTask>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut tasks = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM upload_tasks \
                 WHERE attempt_count < max_attempts \
                   AND ( (status = 'PENDING' AND (next_retry_at IS NULL OR next_retry_at <= ?1)) \
                      OR (status = 'FAILED' AND next_retry_at IS NOT NULL AND next_retry_at <= ?1) ) \
                 ORDER BY created_at ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![to_millis(now), limit as i64], row_to_task)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for task in &mut tasks {
            tx.execute(
                "UPDATE upload_tasks SET status = 'IN_PROGRESS' WHERE id = ?1",
                params![task.id.to_string()],
            )?;
            task.status = TaskStatus::InProgress;
        }
        tx.commit()?;

        if !tasks.is_empty() {
            debug!("claimed {} pending upload task(s)", tasks.len());
        }
        Ok(tasks)
    }

    /// Records a successful attempt: terminal `SUCCESS`, url set,
    /// progress pinned to 1.0. Increments the attempt counter by one.
    pub fn record_success(
        &self,
        id: &TaskId,
        url: &str,
        completed_at: DateTime<Utc>,
    ) -> QueueResult<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE upload_tasks SET \
                status = 'SUCCESS', uploaded_url = ?2, completed_at = ?3, \
                progress = 1.0, attempt_count = attempt_count + 1, \
                error_message = NULL, next_retry_at = NULL \
             WHERE id = ?1",
            params![id.to_string(), url, to_millis(completed_at)],
        )?;
        if n == 0 {
            return Err(QueueError::TaskNotFound(*id));
        }
        debug!("task {id} uploaded to {url}");
        Ok(())
    }

    /// Records a failed attempt. `next_retry_at = None` marks the failure
    /// terminal (exhausted attempts, or a non-retryable error); otherwise
    /// the task becomes claimable again once the retry time passes.
    /// Increments the attempt counter by one.
    pub fn record_failure(
        &self,
        id: &TaskId,
        error_message: &str,
        last_attempt_at: DateTime<Utc>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE upload_tasks SET \
                status = 'FAILED', error_message = ?2, last_attempt_at = ?3, \
                next_retry_at = ?4, attempt_count = attempt_count + 1 \
             WHERE id = ?1",
            params![
                id.to_string(),
                error_message,
                to_millis(last_attempt_at),
                next_retry_at.map(to_millis),
            ],
        )?;
        if n == 0 {
            return Err(QueueError::TaskNotFound(*id));
        }
        Ok(())
    }

    /// Updates fractional progress for an in-flight task. Clamped to [0, 1].
    pub fn set_progress(&self, id: &TaskId, progress: f64) -> QueueResult<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE upload_tasks SET progress = ?2 WHERE id = ?1",
            params![id.to_string(), progress.clamp(0.0, 1.0)],
        )?;
        if n == 0 {
            return Err(QueueError::TaskNotFound(*id));
        }
        Ok(())
    }

    /// Fetches a task by id.
    pub fn get(&self, id: &TaskId) -> QueueResult<Option<UploadTask>> {
        let conn = self.conn.lock().unwrap();
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM upload_tasks WHERE id = ?1"),
                params![id.to_string()],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// Returns the active (`PENDING` or `IN_PROGRESS`) task for a file, if any.
    pub fn active_task_for_file(&self, file_id: &FileId) -> QueueResult<Option<UploadTask>> {
        let conn = self.conn.lock().unwrap();
        let task = conn
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM upload_tasks \
                     WHERE file_id = ?1 AND status IN ('PENDING', 'IN_PROGRESS') \
                     ORDER BY created_at ASC LIMIT 1"
                ),
                params![file_id.to_string()],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// Deletes a task. Used for external cancellation; an in-flight
    /// attempt whose task has been deleted is dropped without recording.
    pub fn delete(&self, id: &TaskId) -> QueueResult<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM upload_tasks WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(n > 0)
    }

    /// Puts an exhausted (or otherwise failed) task back into rotation:
    /// status `PENDING`, attempt counter zeroed, retry schedule cleared.
    /// The UI's "retry now" action.
    pub fn reset_for_retry(&self, id: &TaskId) -> QueueResult<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE upload_tasks SET \
                status = 'PENDING', attempt_count = 0, progress = 0.0, \
                next_retry_at = NULL, error_message = NULL \
             WHERE id = ?1 AND status = 'FAILED'",
            params![id.to_string()],
        )?;
        if n == 0 {
            return Err(QueueError::TaskNotFound(*id));
        }
        Ok(())
    }

    /// Counts tasks by status.
    pub fn summary(&self) -> QueueResult<QueueSummary> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM upload_tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut summary = QueueSummary::default();
        for row in rows {
            let (status, count) = row?;
            match TaskStatus::parse(&status) {
                Some(TaskStatus::Pending) => summary.pending = count as u64,
                Some(TaskStatus::InProgress) => summary.in_progress = count as u64,
                Some(TaskStatus::Success) => summary.succeeded = count as u64,
                Some(TaskStatus::Failed) => summary.failed = count as u64,
                None => return Err(QueueError::CorruptRow(format!("unknown status {status}"))),
            }
        }
        Ok(summary)
    }

    /// Purges completed rows. Returns the number deleted.
    pub fn purge_completed(&self) -> QueueResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM upload_tasks WHERE status = 'SUCCESS'", [])?;
        Ok(n)
    }

    /// Purges exhausted-failure rows. Returns the number deleted.
    pub fn purge_exhausted(&self) -> QueueResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM upload_tasks \
             WHERE status = 'FAILED' AND attempt_count >= max_attempts",
            [],
        )?;
        Ok(n)
    }
}

fn initialize_schema(conn: &Connection) -> QueueResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS upload_tasks (
            id TEXT PRIMARY KEY,
            file_id TEXT NOT NULL,
            status TEXT NOT NULL,
            progress REAL NOT NULL DEFAULT 0.0,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            media_type TEXT NOT NULL,
            folder_id TEXT,
            created_at INTEGER NOT NULL,
            last_attempt_at INTEGER,
            next_retry_at INTEGER,
            completed_at INTEGER,
            error_message TEXT,
            uploaded_url TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_upload_tasks_claim
            ON upload_tasks (status, next_retry_at, created_at);
        CREATE INDEX IF NOT EXISTS idx_upload_tasks_file
            ON upload_tasks (file_id);",
    )?;
    Ok(())
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadTask> {
    let id: String = row.get(0)?;
    let file_id: String = row.get(1)?;
    let status: String = row.get(2)?;
    let media_type: String = row.get(6)?;
    let folder_id: Option<String> = row.get(7)?;

    Ok(UploadTask {
        id: TaskId::parse(&id).ok_or_else(|| bad_column(0, &id))?,
        file_id: FileId::parse(&file_id).ok_or_else(|| bad_column(1, &file_id))?,
        status: TaskStatus::parse(&status).ok_or_else(|| bad_column(2, &status))?,
        progress: row.get(3)?,
        attempt_count: row.get::<_, i64>(4)? as u32,
        max_attempts: row.get::<_, i64>(5)? as u32,
        media_type: MediaType::parse(&media_type).ok_or_else(|| bad_column(6, &media_type))?,
        folder_id: folder_id
            .map(|f| FolderId::parse(&f).ok_or_else(|| bad_column(7, &f)))
            .transpose()?,
        created_at: from_millis(row.get(8)?),
        last_attempt_at: row.get::<_, Option<i64>>(9)?.map(from_millis),
        next_retry_at: row.get::<_, Option<i64>>(10)?.map(from_millis),
        completed_at: row.get::<_, Option<i64>>(11)?.map(from_millis),
        error_message: row.get(12)?,
        uploaded_url: row.get(13)?,
    })
}

fn bad_column(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unparseable value: {value}").into(),
    )
}

fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}
