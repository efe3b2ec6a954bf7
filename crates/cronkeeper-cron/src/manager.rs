//! Job manager — owns the job cache and applies user edits.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use cronkeeper_storage::{JobStore, StorageError};
use cronkeeper_types::{Job, JobId};

use crate::crontab::CrontabBackend;
use crate::error::TableError;
use crate::sync::{SyncError, SyncReport, TableSynchronizer};
use crate::table::parse_table;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("job not found: {0}")]
    NotFound(JobId),
}

pub type Result<T> = std::result::Result<T, ManagerError>;

/// Fields for a job being created.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub expression: String,
    pub script_path: String,
    pub log_path: Option<String>,
    pub enabled: bool,
}

/// Partial edit of a job. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub name: Option<String>,
    pub expression: Option<String>,
    pub script_path: Option<String>,
    /// `Some(None)` clears the log path.
    pub log_path: Option<Option<String>>,
    pub enabled: Option<bool>,
}

impl JobUpdate {
    fn apply(self, job: &mut Job) {
        if let Some(name) = self.name {
            job.name = name;
        }
        if let Some(expression) = self.expression {
            job.expression = expression.trim().to_string();
        }
        if let Some(script_path) = self.script_path {
            job.script_path = script_path;
        }
        if let Some(log_path) = self.log_path {
            job.log_path = log_path;
        }
        if let Some(enabled) = self.enabled {
            job.enabled = enabled;
        }
    }
}

/// Application context for job definitions.
///
/// Every mutation writes through to the store, refreshes the cache and
/// reinstalls the schedule table. Mutations hold the shared gate for their
/// whole duration, so they never interleave with each other or with a
/// failure-watch tick holding the same gate.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    synchronizer: TableSynchronizer,
    jobs: RwLock<Vec<Job>>,
    gate: Arc<Mutex<()>>,
}

impl JobManager {
    /// Create a new manager.
    pub fn new(store: Arc<dyn JobStore>, backend: Arc<dyn CrontabBackend>) -> Self {
        Self {
            synchronizer: TableSynchronizer::new(store.clone(), backend),
            store,
            jobs: RwLock::new(Vec::new()),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Serialization gate shared with anything that must not interleave with edits.
    pub fn gate(&self) -> Arc<Mutex<()>> {
        self.gate.clone()
    }

    pub fn synchronizer(&self) -> &TableSynchronizer {
        &self.synchronizer
    }

    /// Load jobs from storage into the cache.
    pub async fn load(&self) -> Result<()> {
        let _guard = self.gate.lock().await;
        self.refresh().await
    }

    /// List cached jobs.
    pub async fn list_jobs(&self) -> Vec<Job> {
        self.jobs.read().await.clone()
    }

    pub async fn get_job(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.iter().find(|j| j.id == *id).cloned()
    }

    /// Create a job. The expression is stored as given and may be invalid.
    pub async fn add_job(&self, new: NewJob) -> Result<Job> {
        let _guard = self.gate.lock().await;
        let mut job = Job::new(new.name, new.expression.trim(), new.script_path);
        job.log_path = new.log_path;
        job.enabled = new.enabled;

        self.store.save_job(&job).await?;
        info!(job_id = %job.id, name = %job.name, "Job added");
        self.commit().await?;
        Ok(job)
    }

    /// Edit a job in place, keeping its identity and creation time.
    pub async fn update_job(&self, id: &JobId, update: JobUpdate) -> Result<Job> {
        let _guard = self.gate.lock().await;
        let mut job = self
            .store
            .get_job(id)
            .await?
            .ok_or(ManagerError::NotFound(*id))?;
        update.apply(&mut job);

        self.store.save_job(&job).await?;
        info!(job_id = %job.id, "Job updated");
        self.commit().await?;
        Ok(job)
    }

    /// Enable or disable a job.
    pub async fn set_enabled(&self, id: &JobId, enabled: bool) -> Result<Job> {
        self.update_job(
            id,
            JobUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    /// Remove a job and its history.
    pub async fn delete_job(&self, id: &JobId) -> Result<()> {
        let _guard = self.gate.lock().await;
        if !self.store.delete_job(id).await? {
            return Err(ManagerError::NotFound(*id));
        }
        info!(job_id = %id, "Job deleted");
        self.commit().await?;
        Ok(())
    }

    /// Adopt entries of a table as jobs.
    ///
    /// Lines whose script is already managed are ignored. Returns the new jobs.
    pub async fn import(&self, table_text: &str) -> Result<Vec<Job>> {
        let _guard = self.gate.lock().await;
        let mut known: HashSet<String> = self
            .store
            .load_jobs()
            .await?
            .into_iter()
            .map(|j| j.script_path)
            .collect();

        let mut imported = Vec::new();
        for line in parse_table(table_text) {
            let script = line.script_path().to_string();
            if !known.insert(script.clone()) {
                continue;
            }
            let name = Path::new(&script)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| script.clone());
            let mut job = Job::new(name, line.expression().to_string(), script);
            job.log_path = line.log_path().map(String::from);

            self.store.save_job(&job).await?;
            imported.push(job);
        }

        info!(count = imported.len(), "Imported schedule table entries");
        self.commit().await?;
        Ok(imported)
    }

    /// Adopt the entries currently installed in the system table.
    pub async fn import_installed(&self) -> Result<Vec<Job>> {
        let text = self.synchronizer.read_table().await?;
        self.import(&text).await
    }

    /// Reinstall the schedule table from the stored job set.
    pub async fn sync(&self) -> Result<SyncReport> {
        let _guard = self.gate.lock().await;
        Ok(self.synchronizer.reconcile().await?)
    }

    async fn refresh(&self) -> Result<()> {
        let jobs = self.store.load_jobs().await?;
        info!("Loaded {} jobs", jobs.len());
        *self.jobs.write().await = jobs;
        Ok(())
    }

    async fn commit(&self) -> Result<SyncReport> {
        self.refresh().await?;
        Ok(self.synchronizer.reconcile().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronkeeper_storage::SqliteJobStore;

    #[derive(Default)]
    struct FakeCrontab {
        table: Mutex<String>,
    }

    #[async_trait::async_trait]
    impl CrontabBackend for FakeCrontab {
        async fn read(&self) -> std::result::Result<String, TableError> {
            Ok(self.table.lock().await.clone())
        }

        async fn write(&self, content: &str) -> std::result::Result<(), TableError> {
            *self.table.lock().await = content.to_string();
            Ok(())
        }
    }

    fn manager() -> (JobManager, Arc<SqliteJobStore>, Arc<FakeCrontab>) {
        let store = Arc::new(SqliteJobStore::open_in_memory().unwrap());
        let crontab = Arc::new(FakeCrontab::default());
        (JobManager::new(store.clone(), crontab.clone()), store, crontab)
    }

    fn new_job(name: &str, expression: &str, script: &str) -> NewJob {
        NewJob {
            name: name.into(),
            expression: expression.into(),
            script_path: script.into(),
            log_path: None,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_add_job_installs_entry() {
        let (manager, store, crontab) = manager();
        let job = manager
            .add_job(new_job("backup", " 0 9 * * * ", "/bin/backup.sh"))
            .await
            .unwrap();

        assert_eq!(job.expression, "0 9 * * *");
        assert_eq!(manager.list_jobs().await.len(), 1);
        assert!(store.get_job(&job.id).await.unwrap().is_some());
        assert_eq!(*crontab.table.lock().await, "0 9 * * * /bin/backup.sh\n");
    }

    #[tokio::test]
    async fn test_invalid_expression_is_kept_but_not_installed() {
        let (manager, _store, crontab) = manager();
        let job = manager
            .add_job(new_job("draft", "sometimes", "/bin/draft.sh"))
            .await
            .unwrap();

        assert_eq!(manager.get_job(&job.id).await.unwrap().expression, "sometimes");
        assert_eq!(*crontab.table.lock().await, "");
    }

    #[tokio::test]
    async fn test_update_preserves_identity() {
        let (manager, _store, crontab) = manager();
        let job = manager
            .add_job(new_job("a", "0 9 * * *", "/bin/a.sh"))
            .await
            .unwrap();

        let updated = manager
            .update_job(
                &job.id,
                JobUpdate {
                    name: Some("renamed".into()),
                    expression: Some("30 6 * * 1-5".into()),
                    log_path: Some(Some("/tmp/a.log".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, job.id);
        assert_eq!(updated.created_at, job.created_at);
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.log_path.as_deref(), Some("/tmp/a.log"));
        assert_eq!(*crontab.table.lock().await, "30 6 * * 1-5 /bin/a.sh\n");
    }

    #[tokio::test]
    async fn test_disable_and_delete() {
        let (manager, _store, crontab) = manager();
        let a = manager
            .add_job(new_job("a", "0 9 * * *", "/bin/a.sh"))
            .await
            .unwrap();
        let b = manager
            .add_job(new_job("b", "0 10 * * *", "/bin/b.sh"))
            .await
            .unwrap();

        manager.set_enabled(&a.id, false).await.unwrap();
        assert_eq!(*crontab.table.lock().await, "0 10 * * * /bin/b.sh\n");

        manager.delete_job(&b.id).await.unwrap();
        assert_eq!(*crontab.table.lock().await, "");
        assert_eq!(manager.list_jobs().await.len(), 1);

        let missing = manager.delete_job(&b.id).await.unwrap_err();
        assert!(matches!(missing, ManagerError::NotFound(id) if id == b.id));
    }

    #[tokio::test]
    async fn test_import_adopts_foreign_entries() {
        let (manager, _store, crontab) = manager();
        manager
            .add_job(new_job("a", "0 9 * * *", "/bin/a.sh"))
            .await
            .unwrap();
        *crontab.table.lock().await = "\
0 9 * * * /bin/a.sh
# comment
50 8 * * 1-7 /Users/user/script.sh >> /Users/user/log.log 2>&1
garbage
"
        .into();

        let imported = manager.import_installed().await.unwrap();
        assert_eq!(imported.len(), 1);
        let job = &imported[0];
        assert_eq!(job.name, "script");
        assert_eq!(job.expression, "50 8 * * 1-7");
        assert_eq!(job.script_path, "/Users/user/script.sh");
        assert_eq!(job.log_path.as_deref(), Some("/Users/user/log.log"));

        assert_eq!(manager.list_jobs().await.len(), 2);
        assert_eq!(
            *crontab.table.lock().await,
            "0 9 * * * /bin/a.sh\n50 8 * * 1-7 /Users/user/script.sh\n"
        );
    }

    #[tokio::test]
    async fn test_load_reads_store() {
        let (manager, store, _crontab) = manager();
        store
            .save_job(&Job::new("external", "0 9 * * *", "/bin/x.sh"))
            .await
            .unwrap();
        assert!(manager.list_jobs().await.is_empty());
        manager.load().await.unwrap();
        assert_eq!(manager.list_jobs().await.len(), 1);
    }
}
