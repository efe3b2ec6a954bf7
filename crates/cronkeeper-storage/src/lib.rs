//! cronkeeper-storage: durable storage for job definitions and execution history.
//!
//! The [`JobStore`] trait is the capability the rest of cronkeeper consumes;
//! [`SqliteJobStore`] is the SQLite-backed implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use cronkeeper_types::{
    ExecutionRecord, Job, JobId, JobSnapshot, format_timestamp, parse_timestamp,
};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Load/save/delete access to jobs and their execution history.
///
/// Implementations are the authoritative copy; anything held in memory by
/// callers is a cache.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// All jobs, oldest first.
    async fn load_jobs(&self) -> Result<Vec<Job>>;

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>>;

    /// Insert or replace a job by identity.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Remove a job and its execution history. Returns whether it existed.
    async fn delete_job(&self, id: &JobId) -> Result<bool>;

    /// Retained execution records across all jobs.
    async fn load_executions(&self) -> Result<Vec<ExecutionRecord>>;

    /// Newest-first execution history of one job.
    async fn executions_for(&self, job_id: &JobId, limit: usize) -> Result<Vec<ExecutionRecord>>;

    /// Store a record, then trim the job's history to the newest `retain` entries.
    async fn append_execution(&self, record: &ExecutionRecord, retain: usize) -> Result<()>;

    async fn load_snapshot(&self) -> Result<JobSnapshot> {
        Ok(JobSnapshot {
            jobs: self.load_jobs().await?,
            executions: self.load_executions().await?,
        })
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        expression TEXT NOT NULL,
        script_path TEXT NOT NULL,
        log_path TEXT,
        enabled INTEGER NOT NULL DEFAULT 1,
        group_id TEXT,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT NOT NULL,
        exit_code INTEGER NOT NULL,
        stdout TEXT,
        stderr TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_executions_job
        ON executions (job_id, started_at);";

const JOB_COLUMNS: &str =
    "id, name, expression, script_path, log_path, enabled, group_id, created_at";

const EXECUTION_COLUMNS: &str = "id, job_id, started_at, finished_at, exit_code, stdout, stderr";

/// SQLite-based job store.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode so the script wrapper can append while a watcher reads
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Storage opened: {}", path.display());

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

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await?
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn load_jobs(&self) -> Result<Vec<Job>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at ASC, rowid ASC"
            ))?;
            let jobs = stmt
                .query_map([], job_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(jobs)
        })
        .await
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let job = conn
                .query_row(
                    &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                    rusqlite::params![id],
                    job_from_row,
                )
                .optional()?;
            Ok(job)
        })
        .await
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        let job = job.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO jobs
                    (id, name, expression, script_path, log_path, enabled, group_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    expression = excluded.expression,
                    script_path = excluded.script_path,
                    log_path = excluded.log_path,
                    enabled = excluded.enabled,
                    group_id = excluded.group_id",
                rusqlite::params![
                    job.id.to_string(),
                    job.name,
                    job.expression,
                    job.script_path,
                    job.log_path,
                    job.enabled as i32,
                    job.group_id,
                    format_timestamp(&job.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_job(&self, id: &JobId) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM executions WHERE job_id = ?1",
                rusqlite::params![id],
            )?;
            let count = tx.execute("DELETE FROM jobs WHERE id = ?1", rusqlite::params![id])?;
            tx.commit()?;
            Ok(count > 0)
        })
        .await
    }

    async fn load_executions(&self) -> Result<Vec<ExecutionRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EXECUTION_COLUMNS} FROM executions ORDER BY started_at ASC, rowid ASC"
            ))?;
            let records = stmt
                .query_map([], execution_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    async fn executions_for(&self, job_id: &JobId, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let job_id = job_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EXECUTION_COLUMNS} FROM executions WHERE job_id = ?1
                 ORDER BY started_at DESC, rowid DESC LIMIT ?2"
            ))?;
            let records = stmt
                .query_map(rusqlite::params![job_id, limit], execution_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
    }

    async fn append_execution(&self, record: &ExecutionRecord, retain: usize) -> Result<()> {
        let record = record.clone();
        // Always keep at least the record just written.
        let retain = i64::try_from(retain.max(1)).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let job_id = record.job_id.to_string();
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO executions
                    (id, job_id, started_at, finished_at, exit_code, stdout, stderr)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    record.id.to_string(),
                    job_id,
                    format_timestamp(&record.started_at),
                    format_timestamp(&record.finished_at),
                    record.exit_code,
                    record.stdout,
                    record.stderr,
                ],
            )?;
            let trimmed = tx.execute(
                "DELETE FROM executions WHERE job_id = ?1 AND id NOT IN (
                    SELECT id FROM executions WHERE job_id = ?1
                    ORDER BY started_at DESC, rowid DESC LIMIT ?2
                 )",
                rusqlite::params![job_id, retain],
            )?;
            tx.commit()?;
            if trimmed > 0 {
                tracing::debug!(job_id = %record.job_id, trimmed, "Trimmed execution history");
            }
            Ok(())
        })
        .await
    }
}

fn uuid_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: uuid_column(row, 0)?,
        name: row.get(1)?,
        expression: row.get(2)?,
        script_path: row.get(3)?,
        log_path: row.get(4)?,
        enabled: row.get::<_, i32>(5)? != 0,
        group_id: row.get(6)?,
        created_at: timestamp_column(row, 7)?,
    })
}

fn execution_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    Ok(ExecutionRecord {
        id: uuid_column(row, 0)?,
        job_id: uuid_column(row, 1)?,
        started_at: timestamp_column(row, 2)?,
        finished_at: timestamp_column(row, 3)?,
        exit_code: row.get(4)?,
        stdout: row.get(5)?,
        stderr: row.get(6)?,
    })
}
