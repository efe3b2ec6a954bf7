//! Reconciles stored jobs into the system schedule table.
//!
//! Synchronization is a full overwrite: the installed table becomes exactly
//! the enabled jobs with parsable expressions. Entries the application did not
//! create are destroyed. Integrators who need to keep such entries should
//! adopt them first (see [`crate::JobManager::import`]).
//!
//! Each entry runs the job's `script_path` directly and nothing else. Runs
//! started this way record no execution history unless `script_path` is a
//! wrapper that appends execution records, e.g. one that calls
//! `cronkeeper run` for a disabled job holding the real script. Without one,
//! failure watching only sees runs started by hand.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use cronkeeper_storage::{JobStore, StorageError};
use cronkeeper_types::Job;

use crate::crontab::CrontabBackend;
use crate::error::TableError;
use crate::expression::ScheduleExpression;
use crate::line::ScheduleLine;
use crate::table::{parse_table, render_table};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Exact text installed into the table.
    pub content: String,
    /// Entries written.
    pub written: usize,
    /// Enabled jobs left out because their expression or script is unusable.
    pub skipped: usize,
    /// Previously installed entries that the overwrite removed.
    pub replaced_foreign: usize,
}

/// Table lines for the enabled jobs with a usable expression, in job order.
///
/// Returns the lines and the number of enabled jobs that were left out.
pub fn schedule_lines(jobs: &[Job]) -> (Vec<ScheduleLine>, usize) {
    let mut skipped = 0;
    let lines = jobs
        .iter()
        .filter(|job| job.enabled)
        .filter_map(|job| {
            let line = ScheduleExpression::parse(&job.expression)
                .and_then(|expr| ScheduleLine::new(expr, job.script_path.trim()));
            match line {
                Ok(line) => Some(line),
                Err(e) => {
                    debug!(job_id = %job.id, "Job left out of schedule table: {e}");
                    skipped += 1;
                    None
                }
            }
        })
        .collect();
    (lines, skipped)
}

/// Writes the job set into the system table.
#[derive(Clone)]
pub struct TableSynchronizer {
    store: Arc<dyn JobStore>,
    backend: Arc<dyn CrontabBackend>,
}

impl TableSynchronizer {
    pub fn new(store: Arc<dyn JobStore>, backend: Arc<dyn CrontabBackend>) -> Self {
        Self { store, backend }
    }

    /// Current system table text.
    pub async fn read_table(&self) -> Result<String, TableError> {
        self.backend.read().await
    }

    /// Replace the system table with the stored job set.
    ///
    /// Jobs are read from the store rather than any cache so a just-saved
    /// change is never overwritten by a stale copy. The read-then-write is not
    /// transactional; a concurrent edit by another process is lost.
    pub async fn reconcile(&self) -> Result<SyncReport, SyncError> {
        let jobs = self.store.load_jobs().await?;
        let (lines, skipped) = schedule_lines(&jobs);
        let content = render_table(&lines);

        let installed = self.backend.read().await?;
        let ours: HashSet<String> = lines.iter().map(ToString::to_string).collect();
        let replaced_foreign = parse_table(&installed)
            .iter()
            .filter(|line| !ours.contains(&line.to_string()))
            .count();
        if replaced_foreign > 0 {
            warn!(
                replaced_foreign,
                "Overwriting schedule table entries not managed by cronkeeper"
            );
        }

        self.backend.write(&content).await?;

        info!(written = lines.len(), skipped, "Schedule table synchronized");
        Ok(SyncReport {
            content,
            written: lines.len(),
            skipped,
            replaced_foreign,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronkeeper_storage::SqliteJobStore;
    use tokio::sync::Mutex;

    /// In-memory table tool recording every write.
    #[derive(Default)]
    struct FakeCrontab {
        table: Mutex<String>,
        writes: Mutex<Vec<String>>,
        fail_reads: bool,
        fail_writes: bool,
    }

    #[async_trait::async_trait]
    impl CrontabBackend for FakeCrontab {
        async fn read(&self) -> Result<String, TableError> {
            if self.fail_reads {
                return Err(TableError::ReadFailed("crontab: permission denied".into()));
            }
            Ok(self.table.lock().await.clone())
        }

        async fn write(&self, content: &str) -> Result<(), TableError> {
            if self.fail_writes {
                return Err(TableError::WriteFailed("crontab: installing new crontab failed".into()));
            }
            *self.table.lock().await = content.to_string();
            self.writes.lock().await.push(content.to_string());
            Ok(())
        }
    }

    async fn store_with(jobs: &[Job]) -> Arc<SqliteJobStore> {
        let store = Arc::new(SqliteJobStore::open_in_memory().unwrap());
        for job in jobs {
            store.save_job(job).await.unwrap();
        }
        store
    }

    #[test]
    fn test_schedule_lines_filters_jobs() {
        let mut disabled = Job::new("off", "0 1 * * *", "/bin/off.sh");
        disabled.enabled = false;
        let jobs = vec![
            Job::new("a", "0 9 * * *", "/bin/a.sh"),
            disabled,
            Job::new("broken", "every day", "/bin/broken.sh"),
            Job::new("no script", "0 9 * * *", "  "),
            Job::new("b", " */5  * * * * ", "/bin/b.sh"),
        ];
        let (lines, skipped) = schedule_lines(&jobs);
        let rendered: Vec<String> = lines.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["0 9 * * * /bin/a.sh", "*/5 * * * * /bin/b.sh"]);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_entry_runs_bare_script_path() {
        let job = Job::new("a", "0 9 * * *", "/bin/a.sh").with_log_path("/tmp/a.log");
        let (lines, _) = schedule_lines(&[job]);
        assert_eq!(lines[0].command(), "/bin/a.sh");
        assert_eq!(lines[0].log_path(), None);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let mut disabled = Job::new("off", "0 1 * * *", "/bin/off.sh");
        disabled.enabled = false;
        let store = store_with(&[
            Job::new("a", "0 9 * * *", "/bin/a.sh"),
            disabled,
            Job::new("broken", "0 9 *", "/bin/broken.sh"),
        ])
        .await;
        let crontab = Arc::new(FakeCrontab::default());
        let sync = TableSynchronizer::new(store, crontab.clone());

        let first = sync.reconcile().await.unwrap();
        let second = sync.reconcile().await.unwrap();

        assert_eq!(first.content, "0 9 * * * /bin/a.sh\n");
        assert_eq!(first, second);
        let writes = crontab.writes.lock().await;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], writes[1]);
        assert!(!writes[0].contains("off.sh"));
        assert!(!writes[0].contains("broken.sh"));
    }

    #[tokio::test]
    async fn test_reconcile_overwrites_foreign_entries() {
        let store = store_with(&[Job::new("a", "0 9 * * *", "/bin/a.sh")]).await;
        let crontab = Arc::new(FakeCrontab::default());
        *crontab.table.lock().await =
            "# user notes\n0 9 * * * /bin/a.sh\n15 3 * * * /home/me/manual.sh\n".into();
        let sync = TableSynchronizer::new(store, crontab.clone());

        let report = sync.reconcile().await.unwrap();
        assert_eq!(report.replaced_foreign, 1);
        assert_eq!(*crontab.table.lock().await, "0 9 * * * /bin/a.sh\n");
    }

    #[tokio::test]
    async fn test_reconcile_empty_job_set_clears_table() {
        let store = store_with(&[]).await;
        let crontab = Arc::new(FakeCrontab::default());
        *crontab.table.lock().await = "0 9 * * * /bin/old.sh\n".into();
        let sync = TableSynchronizer::new(store, crontab.clone());

        let report = sync.reconcile().await.unwrap();
        assert_eq!(report.written, 0);
        assert_eq!(*crontab.table.lock().await, "");
    }

    #[tokio::test]
    async fn test_reconcile_write_failure() {
        let store = store_with(&[Job::new("a", "0 9 * * *", "/bin/a.sh")]).await;
        let crontab = Arc::new(FakeCrontab {
            fail_writes: true,
            ..Default::default()
        });
        let sync = TableSynchronizer::new(store, crontab);

        let err = sync.reconcile().await.unwrap_err();
        assert!(matches!(err, SyncError::Table(TableError::WriteFailed(_))));
    }

    #[tokio::test]
    async fn test_reconcile_read_failure_writes_nothing() {
        let store = store_with(&[Job::new("a", "0 9 * * *", "/bin/a.sh")]).await;
        let crontab = Arc::new(FakeCrontab {
            fail_reads: true,
            ..Default::default()
        });
        let sync = TableSynchronizer::new(store, crontab.clone());

        let err = sync.reconcile().await.unwrap_err();
        assert!(matches!(err, SyncError::Table(TableError::ReadFailed(_))));
        assert!(crontab.writes.lock().await.is_empty());
    }
}
