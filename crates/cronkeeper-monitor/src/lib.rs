//! cronkeeper-monitor: failure detection for scheduled jobs.
//!
//! [`FailureWatch`] polls the job store and raises one notification per
//! execution that is newly observed to have failed.

pub mod notify;
pub mod watch;

pub use notify::{DesktopNotifier, LogNotifier, Notifier};
pub use watch::{DEFAULT_POLL_INTERVAL, FailureAlert, FailureWatch};
