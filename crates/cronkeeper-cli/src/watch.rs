use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use cronkeeper_monitor::FailureWatch;

use crate::app::App;

/// Poll for failed runs until Ctrl-C.
pub async fn run_watch(app: &App, interval_secs: Option<u64>) -> Result<()> {
    if interval_secs.is_none() && !app.config.watch.enabled {
        println!("Failure watching is disabled in the config (pass --interval to override)");
        return Ok(());
    }
    let interval = poll_interval(interval_secs.unwrap_or(app.config.watch.interval_secs));

    let mut watch =
        FailureWatch::new(app.store.clone(), app.notifier()).with_gate(app.manager.gate());
    watch.start(interval).await;
    info!(interval_secs = interval.as_secs(), "Watching for failed runs");
    println!("Watching for failed runs every {}s, Ctrl-C to stop", interval.as_secs());

    let waited = tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C");
    watch.stop().await;
    waited?;
    info!("Failure watch stopped");
    Ok(())
}

fn poll_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}
