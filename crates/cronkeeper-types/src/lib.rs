use chrono::{DateTime, SecondsFormat, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a [`Job`]. Stable for the lifetime of the job.
pub type JobId = Uuid;

/// Identity of an [`ExecutionRecord`].
pub type ExecutionId = Uuid;

// ──────────────────── Timestamps ────────────────────

/// Render a timestamp as ISO-8601 UTC with second precision (`2026-02-17T09:00:00Z`).
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 / RFC 3339 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

mod iso_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

// ──────────────────── Job ────────────────────

/// The application's own record of an intended periodic task.
///
/// The expression is kept as the raw string the user entered. It is parsed
/// lazily and may be invalid, in which case the job simply has no entry in
/// the system table until it is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Display name, used in listings and failure notifications.
    pub name: String,
    /// Five-field schedule expression as entered.
    pub expression: String,
    /// Script invoked by the schedule-table entry.
    pub script_path: String,
    /// Where the script's output is appended, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    pub enabled: bool,
    /// Reserved for grouping in the presentation layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(with = "iso_seconds")]
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new enabled job with a fresh identity, created now.
    pub fn new(
        name: impl Into<String>,
        expression: impl Into<String>,
        script_path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            expression: expression.into(),
            script_path: script_path.into(),
            log_path: None,
            enabled: true,
            group_id: None,
            created_at: Utc::now().trunc_subsecs(0),
        }
    }

    pub fn with_log_path(mut self, log_path: impl Into<String>) -> Self {
        self.log_path = Some(log_path.into());
        self
    }
}

// ──────────────────── Execution Records ────────────────────

/// Outcome of one run of a job's script.
///
/// Produced by the script wrapper and immutable once written. Absent or empty
/// captured output is serialized as `null`, never as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: ExecutionId,
    pub job_id: JobId,
    #[serde(with = "iso_seconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "iso_seconds")]
    pub finished_at: DateTime<Utc>,
    pub exit_code: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ExecutionRecord {
    /// Build a record with a fresh identity.
    ///
    /// Timestamps are truncated to whole seconds, a finish time earlier than
    /// the start is clamped to the start, and empty captured output is
    /// normalized to `None`.
    pub fn new(
        job_id: JobId,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        exit_code: i32,
        stdout: Option<String>,
        stderr: Option<String>,
    ) -> Self {
        let started_at = started_at.trunc_subsecs(0);
        Self {
            id: Uuid::new_v4(),
            job_id,
            started_at,
            finished_at: finished_at.trunc_subsecs(0).max(started_at),
            exit_code,
            stdout: non_empty(stdout),
            stderr: non_empty(stderr),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn duration(&self) -> TimeDelta {
        self.finished_at - self.started_at
    }
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}

// ──────────────────── Snapshot ────────────────────

/// A full load of jobs and their retained execution history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub jobs: Vec<Job>,
    pub executions: Vec<ExecutionRecord>,
}

impl JobSnapshot {
    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == *id)
    }

    pub fn execution(&self, id: &ExecutionId) -> Option<&ExecutionRecord> {
        self.executions.iter().find(|e| e.id == *id)
    }

    /// Most recent execution of a job, by start time.
    pub fn last_execution(&self, job_id: &JobId) -> Option<&ExecutionRecord> {
        self.executions
            .iter()
            .filter(|e| e.job_id == *job_id)
            .max_by_key(|e| e.started_at)
    }
}
