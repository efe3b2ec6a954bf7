//! Boundary with the system schedule-table tool.

use std::io::Write;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TableError;

/// stderr fragment the tool prints when the user has no table yet.
const NO_TABLE_MARKER: &str = "no crontab for";

/// Read/replace access to the system-wide schedule table.
#[async_trait]
pub trait CrontabBackend: Send + Sync {
    /// Current table text. A missing table reads as empty.
    async fn read(&self) -> Result<String, TableError>;

    /// Replace the whole table with `content`.
    async fn write(&self, content: &str) -> Result<(), TableError>;
}

/// The `crontab` command-line tool.
///
/// `args` are placed before the operation arguments, e.g. `["-u", "alice"]`.
#[derive(Debug, Clone)]
pub struct SystemCrontab {
    program: String,
    args: Vec<String>,
}

impl SystemCrontab {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd
    }
}

impl Default for SystemCrontab {
    fn default() -> Self {
        Self::new("crontab")
    }
}

#[async_trait]
impl CrontabBackend for SystemCrontab {
    async fn read(&self) -> Result<String, TableError> {
        let output = self
            .command()
            .arg("-l")
            .output()
            .await
            .map_err(|e| TableError::ReadFailed(format!("failed to run {}: {e}", self.program)))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains(NO_TABLE_MARKER) {
            debug!("No schedule table installed yet, treating as empty");
            return Ok(String::new());
        }
        Err(TableError::ReadFailed(failure_detail(&output.status, &stderr)))
    }

    async fn write(&self, content: &str) -> Result<(), TableError> {
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|e| TableError::WriteFailed(format!("temporary file: {e}")))?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| TableError::WriteFailed(format!("temporary file: {e}")))?;

        let output = self
            .command()
            .arg(file.path())
            .output()
            .await
            .map_err(|e| TableError::WriteFailed(format!("failed to run {}: {e}", self.program)))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(TableError::WriteFailed(failure_detail(&output.status, &stderr)))
        }
    }
}

fn failure_detail(status: &std::process::ExitStatus, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {status}")
    } else {
        stderr.to_string()
    }
}
