use super::guard::RunGuard;
use super::{Job, JobContext, JobGroup};
use crate::metrics::SchedulerMetrics;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// The per-routine backup engine the scheduler delegates to.
///
/// Both run methods are synchronous and return once the operation completed or
/// failed. Failures are expected to be logged and counted by the implementation;
/// the scheduler never sees them.
pub trait RoutineHandler: Send + Sync + 'static {
  fn routine_name(&self) -> &str;

  fn run_full_backup(&self, now: DateTime<Utc>);

  fn run_incremental_backup(&self, now: DateTime<Utc>);

  /// Time of the last successful full backup, `None` if there never was one.
  fn last_full_run(&self) -> Option<DateTime<Utc>>;
}

/// A full or incremental backup of one routine.
///
/// One instance exists per (routine, group) and is shared by every firing of the
/// recurring trigger, the catch-up run and any ad-hoc run derived from it, so the
/// [`RunGuard`] covers all of them.
pub struct BackupJob {
  handler: Arc<dyn RoutineHandler>,
  group: JobGroup,
  guard: RunGuard,
  metrics: SchedulerMetrics,
}

impl BackupJob {
  pub fn new(handler: Arc<dyn RoutineHandler>, group: JobGroup, metrics: SchedulerMetrics) -> Self {
    Self {
      handler,
      group,
      guard: RunGuard::new(),
      metrics,
    }
  }

  pub fn group(&self) -> JobGroup {
    self.group
  }

  pub fn routine_name(&self) -> &str {
    self.handler.routine_name()
  }

  /// Whether an execution of this job is currently in progress.
  pub fn is_running(&self) -> bool {
    self.guard.is_running()
  }
}

impl Job for BackupJob {
  fn execute(&self, ctx: &JobContext) {
    let Some(_permit) = self.guard.try_acquire() else {
      trace!(
        job_type = %self.group,
        routine = self.handler.routine_name(),
        job_key = %ctx.key,
        "Backup is currently in progress, skipping it"
      );
      self.metrics.record_skipped(self.group);
      return;
    };

    let now = Utc::now();
    debug!(
      job_type = %self.group,
      routine = self.handler.routine_name(),
      instance_id = %ctx.instance_id,
      "Running backup"
    );
    match self.group {
      JobGroup::Full => self.handler.run_full_backup(now),
      JobGroup::Incremental => self.handler.run_incremental_backup(now),
    }
  }

  fn description(&self) -> String {
    format!("{} {} backup job", self.handler.routine_name(), self.group)
  }
}

impl fmt::Debug for BackupJob {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BackupJob")
      .field("routine", &self.handler.routine_name())
      .field("group", &self.group)
      .field("running", &self.guard.is_running())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::JobKey;
  use parking_lot::Mutex;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::thread;
  use std::time::{Duration, Instant};

  #[derive(Default)]
  struct RecordingHandler {
    full: AtomicUsize,
    incremental: AtomicUsize,
    last_now: Mutex<Option<DateTime<Utc>>>,
  }

  impl RoutineHandler for RecordingHandler {
    fn routine_name(&self) -> &str {
      "nightly"
    }
    fn run_full_backup(&self, now: DateTime<Utc>) {
      self.full.fetch_add(1, Ordering::SeqCst);
      *self.last_now.lock() = Some(now);
    }
    fn run_incremental_backup(&self, now: DateTime<Utc>) {
      self.incremental.fetch_add(1, Ordering::SeqCst);
      *self.last_now.lock() = Some(now);
    }
    fn last_full_run(&self) -> Option<DateTime<Utc>> {
      None
    }
  }

  fn ctx(group: JobGroup) -> JobContext {
    JobContext::new(JobKey::with_group("nightly", group), Utc::now())
  }

  #[test]
  fn dispatches_on_group() {
    let handler = Arc::new(RecordingHandler::default());
    let metrics = SchedulerMetrics::new();
    let full = BackupJob::new(handler.clone(), JobGroup::Full, metrics.clone());
    let incr = BackupJob::new(handler.clone(), JobGroup::Incremental, metrics.clone());

    let before = Utc::now();
    full.execute(&ctx(JobGroup::Full));
    incr.execute(&ctx(JobGroup::Incremental));
    incr.execute(&ctx(JobGroup::Incremental));

    assert_eq!(handler.full.load(Ordering::SeqCst), 1);
    assert_eq!(handler.incremental.load(Ordering::SeqCst), 2);
    let last_now = *handler.last_now.lock();
    assert!(last_now.unwrap() >= before);
    assert!(!full.is_running());
    assert_eq!(metrics.snapshot().backups_skipped_full, 0);
  }

  #[test]
  fn description_names_routine_and_group() {
    let handler = Arc::new(RecordingHandler::default());
    let job = BackupJob::new(handler, JobGroup::Incremental, SchedulerMetrics::new());
    assert_eq!(job.description(), "nightly incremental backup job");
  }

  struct BlockingHandler {
    release: AtomicBool,
    calls: AtomicUsize,
  }

  impl RoutineHandler for BlockingHandler {
    fn routine_name(&self) -> &str {
      "busy"
    }
    fn run_full_backup(&self, _now: DateTime<Utc>) {
      self.calls.fetch_add(1, Ordering::SeqCst);
      while !self.release.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
      }
    }
    fn run_incremental_backup(&self, now: DateTime<Utc>) {
      self.run_full_backup(now)
    }
    fn last_full_run(&self) -> Option<DateTime<Utc>> {
      None
    }
  }

  #[test]
  fn overlapping_executions_are_skipped() {
    let attempts = 8;
    let handler = Arc::new(BlockingHandler {
      release: AtomicBool::new(false),
      calls: AtomicUsize::new(0),
    });
    let metrics = SchedulerMetrics::new();
    let job = Arc::new(BackupJob::new(handler.clone(), JobGroup::Incremental, metrics.clone()));

    let handles: Vec<_> = (0..attempts)
      .map(|_| {
        let job = job.clone();
        thread::spawn(move || job.execute(&ctx(JobGroup::Incremental)))
      })
      .collect();

    let deadline = Instant::now() + Duration::from_secs(5);
    while metrics.snapshot().backups_skipped_incremental < attempts - 1 {
      assert!(Instant::now() < deadline, "skips were not recorded in time");
      thread::sleep(Duration::from_millis(5));
    }
    handler.release.store(true, Ordering::SeqCst);
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.backups_skipped_incremental, attempts - 1);
    assert_eq!(snapshot.backups_skipped_full, 0);
    assert!(!job.is_running());
  }
}
