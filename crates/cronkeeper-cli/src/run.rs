use std::process::Stdio;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use cronkeeper_types::{ExecutionRecord, Job};

use crate::app::App;

/// Maximum stored size of each captured stream, in bytes.
const MAX_OUTPUT_BYTES: usize = 200_000;

/// Exit code recorded when the script was terminated by a signal.
const SIGNAL_EXIT_CODE: i32 = -1;

/// Run a job's script, record the outcome and return the script's exit code.
pub async fn run_job(app: &App, key: &str) -> Result<i32> {
    let job = app.find_job(key).await?;
    let record = execute(&job).await?;

    if let Some(log_path) = &job.log_path {
        if let Err(e) = append_log(log_path, &record).await {
            warn!(job_id = %job.id, "Failed to append to {log_path}: {e}");
        }
    }

    app.store
        .append_execution(&record, app.config.history.max_records_per_job)
        .await
        .context("Failed to record execution")?;

    info!(
        job_id = %job.id,
        exit_code = record.exit_code,
        duration_secs = record.duration().num_seconds(),
        "Job finished"
    );
    Ok(record.exit_code)
}

async fn execute(job: &Job) -> Result<ExecutionRecord> {
    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(&job.script_path);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let started_at = Utc::now();
    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to start {}", job.script_path))?;
    let finished_at = Utc::now();

    Ok(ExecutionRecord::new(
        job.id,
        started_at,
        finished_at,
        output.status.code().unwrap_or(SIGNAL_EXIT_CODE),
        Some(capture(&output.stdout)),
        Some(capture(&output.stderr)),
    ))
}

/// Decode captured output, truncating it on a character boundary.
fn capture(bytes: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if text.len() > MAX_OUTPUT_BYTES {
        let mut end = MAX_OUTPUT_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("\n... [output truncated]");
    }
    text
}

async fn append_log(path: &str, record: &ExecutionRecord) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    for stream in [&record.stdout, &record.stderr].into_iter().flatten() {
        file.write_all(stream.as_bytes()).await?;
        if !stream.ends_with('\n') {
            file.write_all(b"\n").await?;
        }
    }
    file.flush().await
}
