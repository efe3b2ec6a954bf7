use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;

use cronkeeper_cron::{JobUpdate, NewJob, ScheduleExpression, ScheduleLine, SyncReport};
use cronkeeper_types::{ExecutionRecord, Job, JobId, format_timestamp};

use crate::app::App;

/// First group of the job id, enough to address it on the command line.
pub fn short_id(id: &JobId) -> String {
    id.to_string()
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Humanized schedule, or a marker for expressions that do not parse.
pub fn schedule_label(expression: &str) -> String {
    match ScheduleExpression::parse(expression) {
        Ok(expr) => expr.humanize(),
        Err(_) => format!("invalid schedule '{expression}'"),
    }
}

pub fn last_run_label(last: Option<&ExecutionRecord>) -> String {
    match last {
        None => "never run".to_string(),
        Some(record) if record.is_success() => {
            format!("ok at {}", format_timestamp(&record.started_at))
        }
        Some(record) => format!(
            "failed (exit code {}) at {}",
            record.exit_code,
            format_timestamp(&record.started_at)
        ),
    }
}

/// Default job name for a script: its file stem.
fn name_from_script(script: &str) -> String {
    Path::new(script)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.to_string())
}

fn warn_if_invalid(expression: &str) {
    if let Err(e) = ScheduleExpression::parse(expression) {
        eprintln!("warning: {e}; the job will not be installed until the schedule is fixed");
    }
}

fn describe(job: &Job) -> String {
    format!(
        "{} {} ({})",
        short_id(&job.id),
        job.name,
        schedule_label(&job.expression)
    )
}

pub async fn run_list(app: &App, json: bool) -> Result<()> {
    let snapshot = app
        .store
        .load_snapshot()
        .await
        .context("Failed to load jobs")?;

    if json {
        let entries: Vec<serde_json::Value> = snapshot
            .jobs
            .iter()
            .map(|job| {
                serde_json::json!({
                    "job": job,
                    "schedule": schedule_label(&job.expression),
                    "last_execution": snapshot.last_execution(&job.id),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if snapshot.jobs.is_empty() {
        println!("No jobs. Add one with `cronkeeper add` or `cronkeeper import`.");
        return Ok(());
    }

    for job in &snapshot.jobs {
        let state = if job.enabled { "on" } else { "off" };
        println!(
            "{}  {:<3}  {:<20}  {}",
            short_id(&job.id),
            state,
            job.name,
            schedule_label(&job.expression)
        );
        println!(
            "          {}  [{}]",
            job.script_path,
            last_run_label(snapshot.last_execution(&job.id))
        );
    }
    Ok(())
}

pub async fn run_add(
    app: &App,
    name: Option<String>,
    schedule: String,
    script: String,
    log: Option<String>,
    disabled: bool,
) -> Result<()> {
    warn_if_invalid(&schedule);
    let job = app
        .manager
        .add_job(NewJob {
            name: name.unwrap_or_else(|| name_from_script(&script)),
            expression: schedule,
            script_path: script,
            log_path: log,
            enabled: !disabled,
        })
        .await?;
    println!("Added {}", describe(&job));
    Ok(())
}

pub struct EditArgs {
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub script: Option<String>,
    pub log: Option<String>,
    pub clear_log: bool,
}

impl EditArgs {
    fn into_update(self) -> Result<JobUpdate> {
        if self.clear_log && self.log.is_some() {
            bail!("--log and --clear-log cannot be combined");
        }
        let log_path = if self.clear_log {
            Some(None)
        } else {
            self.log.map(Some)
        };
        let update = JobUpdate {
            name: self.name,
            expression: self.schedule,
            script_path: self.script,
            log_path,
            enabled: None,
        };
        if update.name.is_none()
            && update.expression.is_none()
            && update.script_path.is_none()
            && update.log_path.is_none()
        {
            bail!("Nothing to change");
        }
        Ok(update)
    }
}

pub async fn run_edit(app: &App, key: &str, args: EditArgs) -> Result<()> {
    let update = args.into_update()?;
    if let Some(expression) = &update.expression {
        warn_if_invalid(expression);
    }
    let job = app.find_job(key).await?;
    let job = app.manager.update_job(&job.id, update).await?;
    println!("Updated {}", describe(&job));
    Ok(())
}

pub async fn run_remove(app: &App, key: &str) -> Result<()> {
    let job = app.find_job(key).await?;
    app.manager.delete_job(&job.id).await?;
    println!("Removed {} {}", short_id(&job.id), job.name);
    Ok(())
}

pub async fn run_set_enabled(app: &App, key: &str, enabled: bool) -> Result<()> {
    let job = app.find_job(key).await?;
    let job = app.manager.set_enabled(&job.id, enabled).await?;
    let verb = if enabled { "Enabled" } else { "Disabled" };
    println!("{verb} {}", describe(&job));
    Ok(())
}

pub fn sync_summary(report: &SyncReport) -> String {
    let mut summary = format!("Installed {} entries", report.written);
    if report.skipped > 0 {
        summary.push_str(&format!(", skipped {} with invalid schedules", report.skipped));
    }
    if report.replaced_foreign > 0 {
        summary.push_str(&format!(
            ", replaced {} unmanaged entries (use `cronkeeper import` to adopt them first)",
            report.replaced_foreign
        ));
    }
    summary
}

pub async fn run_sync(app: &App) -> Result<()> {
    let report = app.manager.sync().await?;
    println!("{}", sync_summary(&report));
    Ok(())
}

pub async fn run_import(app: &App, file: Option<PathBuf>) -> Result<()> {
    let imported = match file {
        Some(path) => {
            let text = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            app.manager.import(&text).await?
        }
        None => app.manager.import_installed().await?,
    };

    if imported.is_empty() {
        println!("Nothing new to import");
    }
    for job in &imported {
        println!("Imported {}", describe(job));
    }
    Ok(())
}

/// Describe an expression, or a whole table line, without touching any state.
pub fn explain(input: &str) -> Result<String> {
    let (expression, line) = match ScheduleExpression::parse(input) {
        Ok(expr) => (expr, None),
        Err(expr_err) => match ScheduleLine::parse(input) {
            Ok(line) => (line.expression().clone(), Some(line)),
            Err(_) => return Err(expr_err.into()),
        },
    };

    let mut out = format!("{expression}\n  {}", expression.humanize());
    if let Some(next) = expression.next_run(Utc::now()) {
        out.push_str(&format!("\n  next run: {}", format_timestamp(&next)));
    }
    if let Some(line) = line {
        out.push_str(&format!("\n  script: {}", line.script_path()));
        if let Some(log) = line.log_path() {
            out.push_str(&format!("\n  log: {log}"));
        }
    }
    Ok(out)
}

pub async fn run_history(app: &App, key: &str, limit: usize, json: bool) -> Result<()> {
    let job = app.find_job(key).await?;
    let records = app
        .store
        .executions_for(&job.id, limit)
        .await
        .context("Failed to load history")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("{} has not run yet", job.name);
        return Ok(());
    }
    for record in &records {
        println!("{}", history_line(record));
    }
    Ok(())
}

fn history_line(record: &ExecutionRecord) -> String {
    let status = if record.is_success() {
        "ok".to_string()
    } else {
        format!("exit {}", record.exit_code)
    };
    let mut line = format!(
        "{}  {:<8}  {}s",
        format_timestamp(&record.started_at),
        status,
        record.duration().num_seconds()
    );
    if !record.is_success()
        && let Some(first) = record.stderr.as_deref().and_then(|e| e.lines().next())
    {
        line.push_str("  ");
        line.push_str(first);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_schedule_label() {
        assert_eq!(schedule_label("0 9 * * *"), "Every day at 09:00");
        assert_eq!(schedule_label("bad"), "invalid schedule 'bad'");
    }

    #[test]
    fn test_last_run_label() {
        let start = Utc.with_ymd_and_hms(2026, 2, 17, 9, 0, 0).unwrap();
        let ok = ExecutionRecord::new(Uuid::new_v4(), start, start, 0, None, None);
        let failed = ExecutionRecord { exit_code: 3, ..ok.clone() };
        assert_eq!(last_run_label(None), "never run");
        assert_eq!(last_run_label(Some(&ok)), "ok at 2026-02-17T09:00:00Z");
        assert_eq!(
            last_run_label(Some(&failed)),
            "failed (exit code 3) at 2026-02-17T09:00:00Z"
        );
    }

    #[test]
    fn test_history_line_shows_first_stderr_line() {
        let start = Utc.with_ymd_and_hms(2026, 2, 17, 9, 0, 0).unwrap();
        let record = ExecutionRecord::new(
            Uuid::new_v4(),
            start,
            start + chrono::TimeDelta::seconds(4),
            1,
            None,
            Some("disk full\nmore".into()),
        );
        assert_eq!(
            history_line(&record),
            "2026-02-17T09:00:00Z  exit 1    4s  disk full"
        );
    }

    #[test]
    fn test_short_id_and_default_name() {
        let id = Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(short_id(&id), "67e55044");
        assert_eq!(name_from_script("/usr/local/bin/backup.sh"), "backup");
    }

    #[test]
    fn test_edit_args_validation() {
        let none = EditArgs {
            name: None,
            schedule: None,
            script: None,
            log: None,
            clear_log: false,
        };
        assert!(none.into_update().is_err());

        let clear = EditArgs {
            name: None,
            schedule: None,
            script: None,
            log: None,
            clear_log: true,
        };
        assert_eq!(clear.into_update().unwrap().log_path, Some(None));

        let both = EditArgs {
            name: None,
            schedule: None,
            script: None,
            log: Some("/tmp/x.log".into()),
            clear_log: true,
        };
        assert!(both.into_update().is_err());
    }

    #[test]
    fn test_explain_expression_and_line() {
        let out = explain("30 14 * * 1").unwrap();
        assert!(out.starts_with("30 14 * * 1\n  Mon at 14:30"));

        let out = explain("0  9 * * *   /bin/backup.sh >> /var/log/backup.log").unwrap();
        assert!(out.contains("Every day at 09:00"));
        assert!(out.contains("next run: "));
        assert!(out.contains("script: /bin/backup.sh"));
        assert!(out.contains("log: /var/log/backup.log"));

        assert!(explain("   ").is_err());
    }

    #[test]
    fn test_sync_summary() {
        let report = SyncReport {
            content: String::new(),
            written: 2,
            skipped: 1,
            replaced_foreign: 0,
        };
        assert_eq!(
            sync_summary(&report),
            "Installed 2 entries, skipped 1 with invalid schedules"
        );
    }
}
