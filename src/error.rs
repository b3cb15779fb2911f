use crate::job::{JobGroup, JobKey};

use thiserror::Error;

/// Errors produced while parsing a trigger or computing its next fire time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
  #[error("Invalid cron expression '{expression}': {reason}")]
  InvalidCronExpression { expression: String, reason: String },
  #[error("Cron expression '{0}' has no fire time after the requested instant")]
  NoNextFireTime(String),
  #[error("Run-once trigger has already fired")]
  Expired,
  #[error("Trigger delay {0:?} cannot be represented as a calendar duration")]
  InvalidDelay(std::time::Duration),
}

/// Errors related to the scheduler handle (`schedule_job`, `clear`, queries).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
  #[error("Scheduler has not been started.")]
  NotStarted,
  #[error("Scheduler has already been started.")]
  AlreadyStarted,
  #[error("Scheduler command channel is closed (dispatch loop stopped or panicked).")]
  SchedulerShutdown,
  #[error("Scheduler did not respond to the command (dispatch loop may have stopped).")]
  ResponseFailed,
  #[error("Job {0} is already scheduled.")]
  JobAlreadyExists(JobKey),
  #[error("Job {0} not found.")]
  JobNotFound(JobKey),
  #[error("Cannot schedule job {key}: {source}")]
  InvalidTrigger {
    key: JobKey,
    #[source]
    source: TriggerError,
  },
}

/// Errors related to building a schedule out of a backup configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
  #[error("Routine '{routine}' has an invalid {group} backup cron expression: {source}")]
  InvalidCron {
    routine: String,
    group: JobGroup,
    #[source]
    source: TriggerError,
  },
  #[error(transparent)]
  Scheduler(#[from] SchedulerError),
}

/// Errors a [`HandlerFactory`](crate::backend::HandlerFactory) reports when it
/// cannot build the handler for a routine. Never fatal to a scheduling pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
  #[error("No storage backend bound to routine '{0}'")]
  MissingBackend(String),
  #[error("Routine '{routine}' references unknown {kind} '{name}'")]
  UnknownReference {
    routine: String,
    kind: &'static str,
    name: String,
  },
  #[error("Failed to create handler for routine '{routine}': {reason}")]
  Construction { routine: String, reason: String },
}

/// Errors related to the scheduler shutdown process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
  #[error("Scheduler was never started or has already been shut down.")]
  NotRunning,
  #[error("Timed out waiting for the dispatch loop and in-flight jobs to complete.")]
  Timeout,
  #[error("The dispatch loop panicked during shutdown.")]
  TaskPanic,
}
