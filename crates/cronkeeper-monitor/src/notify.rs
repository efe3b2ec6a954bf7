//! Failure notification delivery.

use async_trait::async_trait;
use tracing::{debug, warn};

const NOTIFICATION_TITLE: &str = "cronkeeper";

/// Delivers "job failed" notifications. Fire-and-forget: delivery problems
/// are logged by the implementation, never returned.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_failure_notification(&self, job_name: &str, exit_code: i32);
}

/// Notification body for a failed run.
pub fn failure_message(job_name: &str, exit_code: i32) -> String {
    format!("{job_name} failed (exit code {exit_code})")
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_failure_notification(&self, job_name: &str, exit_code: i32) {
        warn!(job_name, exit_code, "{}", failure_message(job_name, exit_code));
    }
}

/// Native desktop notifications (`osascript` on macOS, `notify-send` on Linux).
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn send_failure_notification(&self, job_name: &str, exit_code: i32) {
        let message = failure_message(job_name, exit_code);
        let Some(mut cmd) = desktop_command(&message) else {
            warn!("Desktop notifications not supported on this platform: {message}");
            return;
        };

        match cmd.output().await {
            Ok(output) if output.status.success() => {
                debug!(job_name, "Desktop notification sent");
            }
            Ok(output) => {
                warn!(
                    "Failed to send desktop notification: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => warn!("Failed to send desktop notification: {e}"),
        }
    }
}

#[cfg(target_os = "macos")]
fn desktop_command(message: &str) -> Option<tokio::process::Command> {
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        applescript_escape(message),
        applescript_escape(NOTIFICATION_TITLE)
    );
    let mut cmd = tokio::process::Command::new("osascript");
    cmd.arg("-e").arg(script);
    Some(cmd)
}

#[cfg(target_os = "linux")]
fn desktop_command(message: &str) -> Option<tokio::process::Command> {
    let mut cmd = tokio::process::Command::new("notify-send");
    cmd.args([NOTIFICATION_TITLE, message]);
    Some(cmd)
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
fn desktop_command(_message: &str) -> Option<tokio::process::Command> {
    None
}

#[cfg_attr(not(any(target_os = "macos", test)), allow(dead_code))]
fn applescript_escape(text: &str) -> String {
    text.replace('\\', r"\\").replace('"', r#"\""#)
}
