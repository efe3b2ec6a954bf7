//! cronkeeper-cron: schedule expressions, table lines and table synchronization.
//!
//! Parsing ([`ScheduleExpression`], [`ScheduleLine`]) is pure and can be used
//! from any thread. [`TableSynchronizer`] installs the stored job set into the
//! system table through a [`CrontabBackend`], and [`JobManager`] is the
//! context object that applies user edits.

pub mod crontab;
pub mod error;
pub mod expression;
pub mod line;
pub mod manager;
pub mod sync;
pub mod table;

pub use crontab::{CrontabBackend, SystemCrontab};
pub use error::{ParseError, TableError};
pub use expression::ScheduleExpression;
pub use line::ScheduleLine;
pub use manager::{JobManager, JobUpdate, ManagerError, NewJob};
pub use sync::{SyncError, SyncReport, TableSynchronizer};
pub use table::{parse_table, render_table};
