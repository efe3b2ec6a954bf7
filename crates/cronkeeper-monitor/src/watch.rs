//! Failure polling loop.
//!
//! Each tick reloads the full job/execution state, computes the set of failing
//! executions and notifies once for every failing execution that was not
//! already failing on the previous tick. The set of already-notified
//! executions lives only in memory and is rebuilt on every start, seeded from
//! the state at that moment so failures that predate the start never alert.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cronkeeper_storage::JobStore;
use cronkeeper_types::{ExecutionId, JobId, JobSnapshot};

use crate::notify::Notifier;

/// Default time between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// A notification raised for a newly failing execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureAlert {
    pub execution_id: ExecutionId,
    pub job_id: JobId,
    pub job_name: String,
    pub exit_code: i32,
}

#[derive(Default)]
struct WatchState {
    /// Last successfully loaded state.
    snapshot: JobSnapshot,
    /// Failing executions already accounted for.
    notified: HashSet<ExecutionId>,
    /// Whether `notified` reflects a real load yet.
    seeded: bool,
}

fn failing_ids(snapshot: &JobSnapshot) -> HashSet<ExecutionId> {
    snapshot
        .executions
        .iter()
        .filter(|e| !e.is_success())
        .map(|e| e.id)
        .collect()
}

/// What happens on a tick, independent of how ticks are scheduled.
#[derive(Clone)]
struct Ticker {
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    gate: Option<Arc<Mutex<()>>>,
    state: Arc<Mutex<WatchState>>,
}

impl Ticker {
    async fn seed(&self) -> bool {
        let _guard = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        match self.store.load_snapshot().await {
            Ok(snapshot) => {
                let mut state = self.state.lock().await;
                state.notified = failing_ids(&snapshot);
                state.snapshot = snapshot;
                state.seeded = true;
                debug!(failing = state.notified.len(), "Failure watch seeded");
                true
            }
            Err(e) => {
                warn!("Failed to load jobs for failure watch seed: {e}");
                self.state.lock().await.seeded = false;
                false
            }
        }
    }

    async fn tick(&self) -> Vec<FailureAlert> {
        let _guard = match &self.gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let snapshot = match self.store.load_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failure watch reload failed, keeping previous state: {e}");
                return Vec::new();
            }
        };

        let current = failing_ids(&snapshot);
        let mut state = self.state.lock().await;
        if !state.seeded {
            // The seed load failed earlier; adopt this load as the baseline.
            state.notified = current;
            state.snapshot = snapshot;
            state.seeded = true;
            return Vec::new();
        }

        let alerts: Vec<FailureAlert> = snapshot
            .executions
            .iter()
            .filter(|e| !e.is_success() && !state.notified.contains(&e.id))
            .filter_map(|e| {
                let Some(job) = snapshot.job(&e.job_id) else {
                    debug!(execution_id = %e.id, "Failing execution has no job, skipping");
                    return None;
                };
                Some(FailureAlert {
                    execution_id: e.id,
                    job_id: job.id,
                    job_name: job.name.clone(),
                    exit_code: e.exit_code,
                })
            })
            .collect();

        state.notified = current;
        state.snapshot = snapshot;
        drop(state);

        for alert in &alerts {
            info!(
                job_id = %alert.job_id,
                execution_id = %alert.execution_id,
                exit_code = alert.exit_code,
                "Job failed"
            );
            self.notifier
                .send_failure_notification(&alert.job_name, alert.exit_code)
                .await;
        }
        alerts
    }

    async fn run(self, interval: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs_f64(), "Failure watch started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.tick().await;
        }
        info!("Failure watch stopped");
    }
}

struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Polls for newly failing executions; idle until [`start`](Self::start)ed.
pub struct FailureWatch {
    ticker: Ticker,
    poller: Option<Poller>,
}

impl FailureWatch {
    pub fn new(store: Arc<dyn JobStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ticker: Ticker {
                store,
                notifier,
                gate: None,
                state: Arc::new(Mutex::new(WatchState::default())),
            },
            poller: None,
        }
    }

    /// Hold `gate` for the duration of every tick, serializing ticks with
    /// job edits that take the same gate.
    pub fn with_gate(mut self, gate: Arc<Mutex<()>>) -> Self {
        self.ticker.gate = Some(gate);
        self
    }

    /// Reset the notified set to the executions failing right now.
    ///
    /// Returns `false` if the load failed; the next successful tick then
    /// seeds instead of notifying.
    pub async fn seed(&self) -> bool {
        self.ticker.seed().await
    }

    /// Run one reload-and-compare cycle, notifying for and returning each
    /// newly failing execution.
    pub async fn tick(&self) -> Vec<FailureAlert> {
        self.ticker.tick().await
    }

    /// Seed, then tick every `interval` until stopped. Restarts if already polling.
    pub async fn start(&mut self, interval: Duration) {
        self.stop().await;
        self.ticker.seed().await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.ticker.clone().run(interval, cancel.clone()));
        self.poller = Some(Poller { cancel, handle });
    }

    /// Stop polling. A tick in progress completes first; none run afterwards.
    pub async fn stop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.cancel.cancel();
            if let Err(e) = poller.handle.await {
                warn!("Failure watch task ended abnormally: {e}");
            }
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// State as of the last successful load.
    pub async fn snapshot(&self) -> JobSnapshot {
        self.ticker.state.lock().await.snapshot.clone()
    }
}

impl Drop for FailureWatch {
    fn drop(&mut self) {
        if let Some(poller) = &self.poller {
            poller.cancel.cancel();
        }
    }
}
