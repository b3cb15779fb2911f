//! Turns the backup routines of a configuration into scheduled jobs.

use crate::backend::{BackendsHolder, HandlerFactory};
use crate::config::BackupConfig;
use crate::error::ScheduleError;
use crate::job::backup::{BackupJob, RoutineHandler};
use crate::job::{Job, JobDetail, JobGroup, JobKey};
use crate::scheduler::Scheduler;
use crate::trigger::{CronTrigger, Trigger};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

/// Decides whether a full backup has to run right away, in addition to the
/// recurring schedule.
///
/// True if there never was a full backup, if the schedule cannot say when the
/// backup after `last_full_run` was due, or if that backup was due before `now`.
pub fn needs_full_backup_now(
  last_full_run: Option<DateTime<Utc>>,
  trigger: &CronTrigger,
  now: DateTime<Utc>,
) -> bool {
  let Some(last_full_run) = last_full_run else {
    return true;
  };
  match trigger.next_fire_time(last_full_run) {
    Ok(next) => next < now,
    Err(_) => true,
  }
}

/// The parsed triggers of one routine.
#[derive(Debug, Clone)]
struct RoutinePlan {
  name: String,
  full: CronTrigger,
  incremental: Option<CronTrigger>,
}

/// Every trigger of a configuration, parsed up front.
///
/// Building a plan is the only step that can reject a configuration, so a plan
/// always installs without configuration errors.
#[derive(Debug, Clone, Default)]
pub struct SchedulePlan {
  routines: Vec<RoutinePlan>,
}

impl SchedulePlan {
  /// Parses the cron expressions of every routine in `config`, in name order.
  ///
  /// # Errors
  ///
  /// [`ScheduleError::InvalidCron`] for the first malformed expression.
  pub fn build(config: &BackupConfig) -> Result<Self, ScheduleError> {
    let mut routines = Vec::with_capacity(config.backup_routines.len());
    for (name, routine) in &config.backup_routines {
      let full =
        CronTrigger::parse(&routine.interval_cron).map_err(|source| ScheduleError::InvalidCron {
          routine: name.clone(),
          group: JobGroup::Full,
          source,
        })?;
      let incremental = routine
        .incremental_cron()
        .map(CronTrigger::parse)
        .transpose()
        .map_err(|source| ScheduleError::InvalidCron {
          routine: name.clone(),
          group: JobGroup::Incremental,
          source,
        })?;
      routines.push(RoutinePlan {
        name: name.clone(),
        full,
        incremental,
      });
    }
    Ok(Self { routines })
  }

  pub fn len(&self) -> usize {
    self.routines.len()
  }

  pub fn is_empty(&self) -> bool {
    self.routines.is_empty()
  }

  /// Routine names in installation order.
  pub fn routine_names(&self) -> impl Iterator<Item = &str> {
    self.routines.iter().map(|plan| plan.name.as_str())
  }
}

/// Schedules the full and incremental backup jobs of every routine.
///
/// For each routine it registers a recurring full backup under
/// `full::{routine}`, a catch-up run under `default::{routine}` when the last
/// full backup is overdue, and a recurring incremental backup under
/// `incremental::{routine}` when the routine has an incremental schedule.
pub struct RoutineScheduler<F: HandlerFactory> {
  factory: Arc<F>,
  backends: Arc<BackendsHolder<F::Backend>>,
  catch_up_delay: Duration,
}

impl<F: HandlerFactory> RoutineScheduler<F> {
  pub fn new(factory: Arc<F>, backends: Arc<BackendsHolder<F::Backend>>) -> Self {
    Self {
      factory,
      backends,
      catch_up_delay: Duration::ZERO,
    }
  }

  /// Delay of the catch-up full backup after scheduling. Zero (the default) runs it immediately.
  pub fn with_catch_up_delay(mut self, delay: Duration) -> Self {
    self.catch_up_delay = delay;
    self
  }

  pub fn factory(&self) -> &Arc<F> {
    &self.factory
  }

  pub fn backends(&self) -> &Arc<BackendsHolder<F::Backend>> {
    &self.backends
  }

  pub fn catch_up_delay(&self) -> Duration {
    self.catch_up_delay
  }

  /// Rebuilds every backend binding from `config`.
  pub fn rebind_backends(&self, config: &BackupConfig) {
    let backends = self.factory.build_backends(config);
    debug!(count = backends.len(), "Rebinding backup backends");
    self.backends.set_data(backends);
  }

  /// Schedules every routine of `config` on `scheduler`.
  ///
  /// Routines whose handler cannot be built are logged and skipped. A malformed
  /// cron expression fails the call before anything is registered.
  pub async fn schedule_routines(
    &self,
    scheduler: &Scheduler,
    config: &BackupConfig,
  ) -> Result<(), ScheduleError> {
    let plan = SchedulePlan::build(config)?;
    self.install(scheduler, config, plan).await
  }

  /// Registers the jobs of an already validated `plan`.
  pub async fn install(
    &self,
    scheduler: &Scheduler,
    config: &BackupConfig,
    plan: SchedulePlan,
  ) -> Result<(), ScheduleError> {
    for routine in plan.routines {
      let backend = self.backends.get(&routine.name);
      let handler = match self.factory.new_handler(config, &routine.name, backend) {
        Ok(handler) => handler,
        Err(e) => {
          error!(routine = %routine.name, error = %e, "Failed to create backup handler");
          continue;
        }
      };

      self
        .schedule_full_backup(scheduler, &handler, &routine.name, routine.full)
        .await?;

      if let Some(incremental) = routine.incremental {
        self
          .schedule_incremental_backup(scheduler, &handler, &routine.name, incremental)
          .await?;
      }
      info!(routine = %routine.name, "Scheduled backup routine");
    }
    Ok(())
  }

  async fn schedule_full_backup(
    &self,
    scheduler: &Scheduler,
    handler: &Arc<dyn RoutineHandler>,
    routine: &str,
    trigger: CronTrigger,
  ) -> Result<(), ScheduleError> {
    let full_job: Arc<dyn Job> = Arc::new(BackupJob::new(
      handler.clone(),
      JobGroup::Full,
      scheduler.metrics().clone(),
    ));
    let key = JobKey::with_group(routine, JobGroup::Full);
    let detail = JobDetail::new(full_job.clone(), key.clone());
    let catch_up = needs_full_backup_now(handler.last_full_run(), &trigger, Utc::now());

    scheduler.schedule_job(detail.clone(), trigger.into()).await?;
    scheduler.registry().put(key, detail);

    if catch_up {
      debug!(%routine, delay = ?self.catch_up_delay, "Schedule initial full backup");
      let catch_up_detail = JobDetail::new(full_job, JobKey::new(routine));
      scheduler
        .schedule_job(catch_up_detail, Trigger::run_once_after(self.catch_up_delay))
        .await?;
    }
    Ok(())
  }

  async fn schedule_incremental_backup(
    &self,
    scheduler: &Scheduler,
    handler: &Arc<dyn RoutineHandler>,
    routine: &str,
    trigger: CronTrigger,
  ) -> Result<(), ScheduleError> {
    let incremental_job: Arc<dyn Job> = Arc::new(BackupJob::new(
      handler.clone(),
      JobGroup::Incremental,
      scheduler.metrics().clone(),
    ));
    let key = JobKey::with_group(routine, JobGroup::Incremental);
    let detail = JobDetail::new(incremental_job, key.clone());

    scheduler.schedule_job(detail.clone(), trigger.into()).await?;
    scheduler.registry().put(key, detail);
    Ok(())
  }
}

impl<F: HandlerFactory> Clone for RoutineScheduler<F> {
  fn clone(&self) -> Self {
    Self {
      factory: self.factory.clone(),
      backends: self.backends.clone(),
      catch_up_delay: self.catch_up_delay,
    }
  }
}

impl<F: HandlerFactory> fmt::Debug for RoutineScheduler<F> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RoutineScheduler")
      .field("backends", &self.backends.len())
      .field("catch_up_delay", &self.catch_up_delay)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::BackupRoutine;
  use chrono::{Duration as ChronoDuration, TimeZone};

  fn at(h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, mi, 0).unwrap()
  }

  #[test]
  fn never_ran_needs_backup() {
    let hourly = CronTrigger::parse("0 * * * *").unwrap();
    assert!(needs_full_backup_now(None, &hourly, at(12, 0)));
  }

  #[test]
  fn overdue_backup_needs_catch_up() {
    let hourly = CronTrigger::parse("0 * * * *").unwrap();
    // Last run 10:30, next due 11:00, now 12:10.
    assert!(needs_full_backup_now(Some(at(10, 30)), &hourly, at(12, 10)));
  }

  #[test]
  fn recent_backup_needs_nothing() {
    let hourly = CronTrigger::parse("0 * * * *").unwrap();
    // Last run 11:40, next due 12:00, now 11:50.
    assert!(!needs_full_backup_now(Some(at(11, 40)), &hourly, at(11, 50)));
    // Next due exactly now is not in the past.
    assert!(!needs_full_backup_now(Some(at(11, 40)), &hourly, at(12, 0)));
  }

  #[test]
  fn exhausted_schedule_needs_catch_up() {
    let past_only = CronTrigger::parse("0 0 0 1 1 * 2020").unwrap();
    let last = at(10, 0) - ChronoDuration::days(365);
    assert!(needs_full_backup_now(Some(last), &past_only, at(12, 0)));
  }

  #[test]
  fn plan_parses_in_name_order() {
    let config = BackupConfig::new()
      .with_routine("weekly", BackupRoutine::new("0 0 * * 0"))
      .with_routine(
        "hourly",
        BackupRoutine::new("0 * * * *").with_incremental("*/5 * * * *"),
      );
    let plan = SchedulePlan::build(&config).unwrap();
    assert_eq!(plan.routine_names().collect::<Vec<_>>(), vec!["hourly", "weekly"]);
    assert!(plan.routines[0].incremental.is_some());
    assert!(plan.routines[1].incremental.is_none());
  }

  #[test]
  fn plan_rejects_bad_incremental_cron() {
    let config = BackupConfig::new()
      .with_routine("good", BackupRoutine::new("0 * * * *"))
      .with_routine(
        "broken",
        BackupRoutine::new("0 * * * *").with_incremental("every five minutes"),
      );
    match SchedulePlan::build(&config) {
      Err(ScheduleError::InvalidCron { routine, group, .. }) => {
        assert_eq!(routine, "broken");
        assert_eq!(group, JobGroup::Incremental);
      }
      other => panic!("unexpected result: {:?}", other),
    }
  }
}
