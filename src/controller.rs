//! Outward entry points: build the schedule at startup, swap it on
//! reconfiguration and trigger ad-hoc full backups.

use crate::backend::HandlerFactory;
use crate::config::BackupConfig;
use crate::error::{ScheduleError, SchedulerError};
use crate::job::JobKey;
use crate::routine::{RoutineScheduler, SchedulePlan};
use crate::scheduler::Scheduler;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long a scheduler that failed to build its schedule may take to stop.
const ABORT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Replaces the schedule of a running `scheduler` with the one described by `config`.
///
/// Every cron expression is validated first; a malformed one returns
/// [`ScheduleError::InvalidCron`] and leaves the current schedule untouched.
/// Otherwise all jobs are cleared, backends are rebuilt for the new
/// configuration and the routines are scheduled again. Backups already running
/// finish undisturbed.
pub async fn apply_new_config<F: HandlerFactory>(
  scheduler: &Scheduler,
  config: &BackupConfig,
  routines: &RoutineScheduler<F>,
) -> Result<(), ScheduleError> {
  let plan = SchedulePlan::build(config)?;

  scheduler.clear().await?;
  routines.rebind_backends(config);
  routines.install(scheduler, config, plan).await?;

  info!(routines = config.backup_routines.len(), "Applied new backup configuration");
  Ok(())
}

/// Creates and starts a scheduler bound to `cancel` and schedules every routine of `config`.
///
/// Backends are expected to be bound already. If scheduling fails the new
/// scheduler is shut down before the error is returned.
pub async fn schedule_backup<F: HandlerFactory>(
  cancel: &CancellationToken,
  config: &BackupConfig,
  routines: &RoutineScheduler<F>,
) -> Result<Scheduler, ScheduleError> {
  let scheduler = Scheduler::new();
  scheduler.start(cancel.clone())?;

  if let Err(e) = routines.schedule_routines(&scheduler, config).await {
    warn!(error = %e, "Scheduling backup routines failed, stopping scheduler");
    if let Err(shutdown_error) = scheduler.shutdown(Some(ABORT_SHUTDOWN_TIMEOUT)).await {
      warn!(error = %shutdown_error, "Scheduler did not stop cleanly");
    }
    return Err(e);
  }
  Ok(scheduler)
}

/// Schedules an immediate full backup of `routine` outside its regular schedule.
///
/// Returns the key of the ad-hoc job, or `None` if the routine has no
/// recurring full backup on this scheduler. The ad-hoc run shares the run
/// guard of the recurring job, so it is skipped while a full backup of the
/// routine is in progress.
pub async fn schedule_adhoc_full_backup(
  scheduler: &Scheduler,
  routine: &str,
) -> Result<Option<JobKey>, SchedulerError> {
  let Some((detail, trigger)) = scheduler.registry().new_adhoc_full_backup_job(routine) else {
    warn!(%routine, "No full backup job registered for routine");
    return Ok(None);
  };
  let key = detail.key().clone();
  scheduler.schedule_job(detail, trigger).await?;
  info!(%routine, job_key = %key, "Scheduled ad-hoc full backup");
  Ok(Some(key))
}
