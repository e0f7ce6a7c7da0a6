//! remibot-store: SQLite persistence for scheduled tasks.
//!
//! The store is the only durable state in the system. All writes go through
//! a single shared connection, so completion of a task in one poll cycle is
//! visible to the next cycle's due query.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use remibot_types::ScheduledTask;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        description TEXT,
        execution_time TEXT NOT NULL,
        completed INTEGER NOT NULL DEFAULT 0,
        recurring INTEGER NOT NULL DEFAULT 0,
        recurrence_pattern TEXT,
        creator_id TEXT NOT NULL,
        guild_id TEXT,
        channel_id TEXT,
        notification_sent INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_due ON tasks (completed, execution_time);";

const TASK_COLUMNS: &str = "id, title, description, execution_time, completed, recurring, \
     recurrence_pattern, creator_id, guild_id, channel_id, notification_sent, created_at, updated_at";

/// SQLite-backed task store.
pub struct TaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl TaskStore {
    /// Open (or create) the task database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Task store opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a task, assigning its id and timestamps.
    ///
    /// Returns the stored copy; the caller's `id`, `created_at` and
    /// `updated_at` are ignored.
    pub async fn save(&self, task: &ScheduledTask) -> Result<ScheduledTask> {
        let conn = self.conn.clone();
        let mut task = task.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let now = Utc::now();
            conn.execute(
                "INSERT INTO tasks
                    (title, description, execution_time, completed, recurring, recurrence_pattern,
                     creator_id, guild_id, channel_id, notification_sent, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    task.title,
                    task.description,
                    task.execution_time.to_rfc3339(),
                    task.completed as i64,
                    task.recurring as i64,
                    task.recurrence_pattern,
                    task.creator_id,
                    task.guild_id,
                    task.channel_id,
                    task.notification_sent as i64,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )?;
            task.id = conn.last_insert_rowid();
            task.created_at = now;
            task.updated_at = now;
            Ok(task)
        })
        .await?
    }

    /// Persist all mutable fields of an existing task and bump `updated_at`.
    pub async fn update(&self, task: &ScheduledTask) -> Result<ScheduledTask> {
        let conn = self.conn.clone();
        let mut task = task.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let now = Utc::now();
            conn.execute(
                "UPDATE tasks SET
                    title = ?1, description = ?2, execution_time = ?3, completed = ?4,
                    recurring = ?5, recurrence_pattern = ?6, creator_id = ?7, guild_id = ?8,
                    channel_id = ?9, notification_sent = ?10, updated_at = ?11
                 WHERE id = ?12",
                rusqlite::params![
                    task.title,
                    task.description,
                    task.execution_time.to_rfc3339(),
                    task.completed as i64,
                    task.recurring as i64,
                    task.recurrence_pattern,
                    task.creator_id,
                    task.guild_id,
                    task.channel_id,
                    task.notification_sent as i64,
                    now.to_rfc3339(),
                    task.id,
                ],
            )?;
            task.updated_at = now;
            Ok(task)
        })
        .await?
    }

    /// Delete a task by id. Returns false if it did not exist.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let count = conn.execute("DELETE FROM tasks WHERE id = ?1", rusqlite::params![id])?;
            Ok(count > 0)
        })
        .await?
    }

    /// Get a task by id.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<ScheduledTask>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"
            ))?;
            let result = stmt
                .query_row(rusqlite::params![id], task_from_row)
                .optional()?;
            Ok(result)
        })
        .await?
    }

    /// Incomplete tasks due at or before `instant`, earliest first.
    ///
    /// Ties on `execution_time` keep insertion order.
    pub async fn find_due_before(&self, instant: DateTime<Utc>) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks
                 WHERE completed = 0 AND execution_time <= ?1
                 ORDER BY execution_time ASC, id ASC"
            ))?;
            let tasks = stmt
                .query_map(rusqlite::params![instant.to_rfc3339()], task_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
        .await?
    }

    /// All tasks created by a user.
    pub async fn find_by_creator(&self, creator_id: &str) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn.clone();
        let creator_id = creator_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE creator_id = ?1 ORDER BY execution_time ASC, id ASC"
            ))?;
            let tasks = stmt
                .query_map(rusqlite::params![creator_id], task_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
        .await?
    }

    /// All tasks targeting a guild.
    pub async fn find_by_guild(&self, guild_id: &str) -> Result<Vec<ScheduledTask>> {
        let conn = self.conn.clone();
        let guild_id = guild_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE guild_id = ?1 ORDER BY execution_time ASC, id ASC"
            ))?;
            let tasks = stmt
                .query_map(rusqlite::params![guild_id], task_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tasks)
        })
        .await?
    }
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledTask> {
    Ok(ScheduledTask {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        execution_time: parse_timestamp(3, row.get::<_, String>(3)?)?,
        completed: row.get::<_, i64>(4)? != 0,
        recurring: row.get::<_, i64>(5)? != 0,
        recurrence_pattern: row.get(6)?,
        creator_id: row.get(7)?,
        guild_id: row.get(8)?,
        channel_id: row.get(9)?,
        notification_sent: row.get::<_, i64>(10)? != 0,
        created_at: parse_timestamp(11, row.get::<_, String>(11)?)?,
        updated_at: parse_timestamp(12, row.get::<_, String>(12)?)?,
    })
}

// A corrupt timestamp is an error rather than something to paper over.
fn parse_timestamp(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    raw.parse().map_err(|e: chrono::ParseError| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task_at(title: &str, time: DateTime<Utc>) -> ScheduledTask {
        ScheduledTask::new(title, time, "user-1")
    }

    fn t(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_timestamps() {
        let store = TaskStore::open_in_memory().unwrap();
        let saved = store.save(&task_at("a", t(9, 0))).await.unwrap();
        assert!(saved.id > 0);
        assert_eq!(saved.created_at, saved.updated_at);

        let loaded = store.find_by_id(saved.id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "a");
        assert_eq!(loaded.execution_time, t(9, 0));
    }

    #[tokio::test]
    async fn test_find_by_id_not_found() {
        let store = TaskStore::open_in_memory().unwrap();
        assert!(store.find_by_id(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_persists_flags() {
        let store = TaskStore::open_in_memory().unwrap();
        let mut task = store.save(&task_at("a", t(9, 0))).await.unwrap();

        task.completed = true;
        task.notification_sent = true;
        task.description = Some("details".into());
        store.update(&task).await.unwrap();

        let loaded = store.find_by_id(task.id).await.unwrap().unwrap();
        assert!(loaded.completed);
        assert!(loaded.notification_sent);
        assert_eq!(loaded.description, Some("details".into()));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = TaskStore::open_in_memory().unwrap();
        let task = store.save(&task_at("a", t(9, 0))).await.unwrap();
        assert!(store.delete(task.id).await.unwrap());
        assert!(!store.delete(task.id).await.unwrap());
        assert!(store.find_by_id(task.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_due_before_orders_and_filters() {
        let store = TaskStore::open_in_memory().unwrap();
        store.save(&task_at("later", t(11, 0))).await.unwrap();
        store.save(&task_at("earlier", t(9, 0))).await.unwrap();
        let mut done = task_at("done", t(8, 0));
        done.completed = true;
        store.save(&done).await.unwrap();
        store.save(&task_at("future", t(23, 0))).await.unwrap();

        let due = store.find_due_before(t(12, 0)).await.unwrap();
        let titles: Vec<_> = due.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["earlier", "later"]);
    }

    #[tokio::test]
    async fn test_due_before_ties_keep_insertion_order() {
        let store = TaskStore::open_in_memory().unwrap();
        let first = store.save(&task_at("first", t(9, 0))).await.unwrap();
        let second = store.save(&task_at("second", t(9, 0))).await.unwrap();

        let due = store.find_due_before(t(9, 0)).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, first.id);
        assert_eq!(due[1].id, second.id);
    }

    #[tokio::test]
    async fn test_due_before_is_inclusive() {
        let store = TaskStore::open_in_memory().unwrap();
        store.save(&task_at("exact", t(9, 0))).await.unwrap();
        assert_eq!(store.find_due_before(t(9, 0)).await.unwrap().len(), 1);
        assert!(store.find_due_before(t(8, 59)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_timestamp_column_is_an_error() {
        let path = std::env::temp_dir().join(format!(
            "remibot-store-test-{}.db",
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);

        let store = TaskStore::open(&path).unwrap();
        let saved = store.save(&task_at("a", t(9, 0))).await.unwrap();

        // Mangle created_at behind the store's back via a second connection.
        let raw = Connection::open(&path).unwrap();
        raw.execute(
            "UPDATE tasks SET created_at = 'not-a-timestamp' WHERE id = ?1",
            rusqlite::params![saved.id],
        )
        .unwrap();
        drop(raw);

        assert!(store.find_by_id(saved.id).await.is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_find_by_creator_and_guild() {
        let store = TaskStore::open_in_memory().unwrap();
        let mut a = task_at("a", t(9, 0));
        a.guild_id = Some("g1".into());
        store.save(&a).await.unwrap();

        let mut b = ScheduledTask::new("b", t(10, 0), "user-2");
        b.guild_id = Some("g1".into());
        store.save(&b).await.unwrap();

        assert_eq!(store.find_by_creator("user-1").await.unwrap().len(), 1);
        assert_eq!(store.find_by_creator("user-3").await.unwrap().len(), 0);
        assert_eq!(store.find_by_guild("g1").await.unwrap().len(), 2);
        assert_eq!(store.find_by_guild("g2").await.unwrap().len(), 0);
    }
}
