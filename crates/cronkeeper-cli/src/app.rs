//! Wiring shared by every subcommand.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use cronkeeper_config::{CronKeeperConfig, NotifierKind};
use cronkeeper_cron::{CrontabBackend, JobManager, SystemCrontab};
use cronkeeper_monitor::{DesktopNotifier, LogNotifier, Notifier};
use cronkeeper_storage::{JobStore, SqliteJobStore};
use cronkeeper_types::Job;

/// Opened store, manager and the config they were built from.
pub struct App {
    pub config: CronKeeperConfig,
    pub store: Arc<dyn JobStore>,
    pub manager: JobManager,
}

impl App {
    /// Open the on-disk store named by `config` and load the job cache.
    pub async fn open(config: CronKeeperConfig) -> Result<Self> {
        let db_path =
            cronkeeper_config::database_path(&config).context("Failed to resolve data dir")?;
        let store: Arc<dyn JobStore> = Arc::new(
            SqliteJobStore::open(&db_path)
                .with_context(|| format!("Failed to open {}", db_path.display()))?,
        );
        let backend: Arc<dyn CrontabBackend> = Arc::new(
            SystemCrontab::new(config.crontab.program.clone())
                .with_args(config.crontab.args.clone()),
        );
        Self::with_parts(config, store, backend).await
    }

    pub async fn with_parts(
        config: CronKeeperConfig,
        store: Arc<dyn JobStore>,
        backend: Arc<dyn CrontabBackend>,
    ) -> Result<Self> {
        let manager = JobManager::new(store.clone(), backend);
        manager.load().await.context("Failed to load jobs")?;
        Ok(Self {
            config,
            store,
            manager,
        })
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        match self.config.notifications.backend {
            NotifierKind::Desktop => Arc::new(DesktopNotifier),
            NotifierKind::Log => Arc::new(LogNotifier),
        }
    }

    /// Resolve a job reference typed on the command line.
    pub async fn find_job(&self, key: &str) -> Result<Job> {
        let jobs = self.manager.list_jobs().await;
        find_job(&jobs, key).cloned()
    }
}

/// Match `key` against a full id, a unique id prefix, or an exact name.
pub fn find_job<'a>(jobs: &'a [Job], key: &str) -> Result<&'a Job> {
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty job reference");
    }
    if let Some(job) = jobs.iter().find(|j| j.id.to_string() == key) {
        return Ok(job);
    }

    let by_prefix: Vec<&Job> = jobs
        .iter()
        .filter(|j| j.id.to_string().starts_with(key))
        .collect();
    match by_prefix.as_slice() {
        [job] => return Ok(job),
        [] => {}
        _ => bail!("Job reference '{key}' is ambiguous ({} matches)", by_prefix.len()),
    }

    let by_name: Vec<&Job> = jobs.iter().filter(|j| j.name == key).collect();
    match by_name.as_slice() {
        [job] => Ok(job),
        [] => bail!("No job matches '{key}'"),
        _ => bail!("Several jobs are named '{key}', use the id instead"),
    }
}
