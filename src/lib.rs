//! backup-scheduler: Cron-Driven Backup Scheduling
//!
//! Schedules the full and incremental backups of named backup routines on a
//! Tokio-driven dispatcher, keeps at most one execution of each backup job in
//! flight, catches up on overdue full backups at startup and swaps the whole
//! schedule atomically when the configuration changes.
//!
//! # Features
//!
//! - Cron triggers (UTC interpretation, 5-field or second-first 6/7-field forms)
//!   and run-once triggers with an optional delay.
//! - One recurring full backup job per routine under `full::{routine}`, plus an
//!   optional recurring incremental job under `incremental::{routine}`.
//! - Catch-up: a one-off full backup under `default::{routine}` when the last
//!   full backup is missing or overdue.
//! - Single-flight execution per job ([`RunGuard`]); overlapping firings are
//!   skipped and counted.
//! - Reconfiguration via [`apply_new_config`]: validate, clear, rebind backends,
//!   reschedule.
//! - Ad-hoc full backups via [`schedule_adhoc_full_backup`].
//! - Built-in metrics collection (queryable snapshot using `MetricsSnapshot`).
//! - Optional Serde support for configuration and public types (`serde` feature).
//!
//! # Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use backup_scheduler::{
//!   schedule_backup, BackendsHolder, BackupConfig, BackupRoutine, HandlerError, HandlerFactory,
//!   RoutineHandler, RoutineScheduler,
//! };
//! use chrono::{DateTime, Utc};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Handler(String);
//!
//! impl RoutineHandler for Handler {
//!   fn routine_name(&self) -> &str {
//!     &self.0
//!   }
//!   fn run_full_backup(&self, now: DateTime<Utc>) {
//!     println!("full backup of {} at {}", self.0, now);
//!   }
//!   fn run_incremental_backup(&self, now: DateTime<Utc>) {
//!     println!("incremental backup of {} at {}", self.0, now);
//!   }
//!   fn last_full_run(&self) -> Option<DateTime<Utc>> {
//!     None
//!   }
//! }
//!
//! struct Factory;
//!
//! impl HandlerFactory for Factory {
//!   type Backend = ();
//!
//!   fn build_backends(&self, config: &BackupConfig) -> HashMap<String, Arc<()>> {
//!     config.backup_routines.keys().map(|name| (name.clone(), Arc::new(()))).collect()
//!   }
//!
//!   fn new_handler(
//!     &self,
//!     _config: &BackupConfig,
//!     routine_name: &str,
//!     _backend: Option<Arc<()>>,
//!   ) -> Result<Arc<dyn RoutineHandler>, HandlerError> {
//!     Ok(Arc::new(Handler(routine_name.to_string())))
//!   }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let config = BackupConfig::new()
//!     .with_routine("daily", BackupRoutine::new("0 0 * * *"))
//!     .with_routine("hourly", BackupRoutine::new("0 * * * *").with_incremental("*/5 * * * *"));
//!
//!   let factory = Arc::new(Factory);
//!   let backends = Arc::new(BackendsHolder::from_data(factory.build_backends(&config)));
//!   let routines = RoutineScheduler::new(factory, backends);
//!
//!   let cancel = CancellationToken::new();
//!   let scheduler = schedule_backup(&cancel, &config, &routines).await?;
//!   println!("Scheduled jobs: {:?}", scheduler.job_keys().await?);
//!
//!   scheduler.shutdown(None).await?;
//!   Ok(())
//! }
//! ```
//!
//! # Observability
//!
//! - Retrieve metrics snapshots using [`Scheduler::metrics_snapshot`]. See [`MetricsSnapshot`].
//! - Query registrations using [`Scheduler::job_keys`] and [`Scheduler::scheduled_job`].
//! - Integrate with the `tracing` crate for detailed logs; every firing runs
//!   inside a `job_exec` span carrying the job key and a fresh instance id.

// Declare modules within the crate
pub mod backend;
mod command;
pub mod config;
pub mod controller;
mod coordinator;
pub mod error;
pub mod job;
pub mod metrics;
pub mod registry;
pub mod routine;
pub mod scheduler;
pub mod trigger;

// --- Public Re-exports ---

// Core scheduler components
pub use registry::JobRegistry;
pub use scheduler::{Scheduler, SchedulerBuilder};

// Routine scheduling and reconfiguration
pub use backend::{BackendsHolder, HandlerFactory};
pub use config::{BackupConfig, BackupPolicy, BackupRoutine, Storage, StorageType};
pub use controller::{apply_new_config, schedule_adhoc_full_backup, schedule_backup};
pub use routine::{needs_full_backup_now, RoutineScheduler, SchedulePlan};

// Error types
pub use error::{HandlerError, ScheduleError, SchedulerError, ShutdownError, TriggerError};

// Job related types
pub use job::backup::{BackupJob, RoutineHandler};
pub use job::guard::{RunGuard, RunPermit};
pub use job::{InstanceId, Job, JobContext, JobDetail, JobGroup, JobKey, ScheduledJobInfo};

// Trigger types
pub use trigger::{CronTrigger, RunOnceTrigger, Trigger};

// Metrics related types
pub use metrics::{MetricsSnapshot, SchedulerMetrics};
