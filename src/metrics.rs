use crate::job::JobGroup;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// --- Simple Histogram Implementation ---

/// A basic concurrent histogram storing count and sum.
///
/// Suitable for simple latency tracking without detailed percentile information.
#[derive(Debug, Default)]
pub struct SimpleHistogram {
  count: AtomicUsize,
  sum_micros: AtomicUsize,
}

impl SimpleHistogram {
  /// Records a duration observation in the histogram.
  pub fn record(&self, duration: Duration) {
    self.count.fetch_add(1, Ordering::Relaxed);
    self.sum_micros.fetch_add(
      duration.as_micros().try_into().unwrap_or(usize::MAX),
      Ordering::Relaxed,
    );
  }

  /// Gets the total number of observations recorded.
  pub fn get_count(&self) -> usize {
    self.count.load(Ordering::Relaxed)
  }

  /// Gets the total sum of durations recorded (in microseconds).
  pub fn get_sum_micros(&self) -> usize {
    self.sum_micros.load(Ordering::Relaxed)
  }
}

// --- Main Metrics Struct (Internal State) ---

/// Counters shared between the dispatch loop, the scheduler handle and every
/// [`BackupJob`](crate::job::backup::BackupJob).
///
/// Cloning only clones the `Arc`s, so all clones observe the same values.
#[derive(Debug, Clone, Default)]
pub struct SchedulerMetrics {
  // --- Counters (Monotonically increasing) ---
  /// Total number of (job, trigger) pairs accepted by `schedule_job`.
  pub jobs_scheduled: Arc<AtomicUsize>,
  /// Total number of times a trigger elapsed and a job was handed to a task.
  pub jobs_fired: Arc<AtomicUsize>,
  /// Total number of job executions that panicked.
  pub jobs_panicked: Arc<AtomicUsize>,
  /// Total number of `clear` operations processed.
  pub schedule_clears: Arc<AtomicUsize>,
  /// Full backups skipped because a previous run of the same job was still in progress.
  pub backups_skipped_full: Arc<AtomicUsize>,
  /// Incremental backups skipped because a previous run was still in progress.
  pub backups_skipped_incremental: Arc<AtomicUsize>,

  // --- Gauges ---
  /// Current number of registered jobs in the dispatch queue.
  pub jobs_registered_current: Arc<AtomicUsize>,
  /// Current number of job executions in flight.
  pub jobs_running_current: Arc<AtomicUsize>,

  // --- Histograms ---
  /// Execution duration of fired jobs.
  pub job_execution_duration: Arc<SimpleHistogram>,
}

impl SchedulerMetrics {
  /// Creates a new `SchedulerMetrics` instance with all counters initialized to zero.
  pub fn new() -> Self {
    Self::default()
  }

  /// Increments the skip counter belonging to `group`.
  pub fn record_skipped(&self, group: JobGroup) {
    let counter = match group {
      JobGroup::Full => &self.backups_skipped_full,
      JobGroup::Incremental => &self.backups_skipped_incremental,
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metric values.
  pub fn snapshot(&self) -> MetricsSnapshot {
    let order = Ordering::Relaxed;

    MetricsSnapshot {
      jobs_scheduled: self.jobs_scheduled.load(order),
      jobs_fired: self.jobs_fired.load(order),
      jobs_panicked: self.jobs_panicked.load(order),
      schedule_clears: self.schedule_clears.load(order),
      backups_skipped_full: self.backups_skipped_full.load(order),
      backups_skipped_incremental: self.backups_skipped_incremental.load(order),
      jobs_registered_current: self.jobs_registered_current.load(order),
      jobs_running_current: self.jobs_running_current.load(order),
      job_execution_duration_count: self.job_execution_duration.get_count(),
      job_execution_duration_sum_micros: self.job_execution_duration.get_sum_micros(),
    }
  }
}

// --- Metrics Snapshot Struct (Public Data) ---

/// A snapshot of the scheduler's metrics at a specific point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
  // Counters
  pub jobs_scheduled: usize,
  pub jobs_fired: usize,
  pub jobs_panicked: usize,
  pub schedule_clears: usize,
  pub backups_skipped_full: usize,
  pub backups_skipped_incremental: usize,
  // Gauges
  pub jobs_registered_current: usize,
  pub jobs_running_current: usize,
  // Histogram Data
  pub job_execution_duration_count: usize,
  pub job_execution_duration_sum_micros: usize,
}

impl MetricsSnapshot {
  /// Skip count for the given job group.
  pub fn skipped(&self, group: JobGroup) -> usize {
    match group {
      JobGroup::Full => self.backups_skipped_full,
      JobGroup::Incremental => self.backups_skipped_incremental,
    }
  }

  /// Mean job execution duration, if any job completed.
  pub fn mean_execution_duration(&self) -> Option<Duration> {
    if self.job_execution_duration_count == 0 {
      None
    } else {
      let mean = self.job_execution_duration_sum_micros / self.job_execution_duration_count;
      Some(Duration::from_micros(mean as u64))
    }
  }
}
