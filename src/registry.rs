//! Registry of the recurring jobs built for each routine.

use crate::job::{JobDetail, JobGroup, JobKey};
use crate::trigger::Trigger;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

/// Thread-safe `JobKey → JobDetail` map.
///
/// Owned by a [`Scheduler`](crate::Scheduler) (one registry per scheduler) and
/// emptied whenever that scheduler is cleared.
#[derive(Debug, Default)]
pub struct JobRegistry {
  jobs: Mutex<HashMap<JobKey, JobDetail>>,
  adhoc_sequence: AtomicU64,
}

impl JobRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Inserts `detail` under `key`, replacing any previous entry.
  pub fn put(&self, key: JobKey, detail: JobDetail) {
    self.jobs.lock().insert(key, detail);
  }

  pub fn get(&self, key: &JobKey) -> Option<JobDetail> {
    self.jobs.lock().get(key).cloned()
  }

  pub fn remove(&self, key: &JobKey) -> Option<JobDetail> {
    self.jobs.lock().remove(key)
  }

  pub fn clear(&self) {
    self.jobs.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.jobs.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.jobs.lock().is_empty()
  }

  /// All registered keys, sorted.
  pub fn keys(&self) -> Vec<JobKey> {
    let mut keys: Vec<JobKey> = self.jobs.lock().keys().cloned().collect();
    keys.sort();
    keys
  }

  /// Derives a one-off full backup of `routine` from its recurring full job.
  ///
  /// The returned detail shares the recurring job (and therefore its run guard)
  /// under the key `{routine}-adhoc-{unix millis}-{sequence}` in the full group, paired with
  /// a run-once trigger firing immediately. Returns `None` if the routine has no
  /// registered full job. Scheduling the result is up to the caller.
  pub fn new_adhoc_full_backup_job(&self, routine: &str) -> Option<(JobDetail, Trigger)> {
    let jobs = self.jobs.lock();
    let recurring = jobs.get(&JobKey::with_group(routine, JobGroup::Full))?;
    let sequence = self.adhoc_sequence.fetch_add(1, Ordering::Relaxed);
    let key = JobKey::with_group(
      format!(
        "{}-adhoc-{}-{}",
        routine,
        Utc::now().timestamp_millis(),
        sequence
      ),
      JobGroup::Full,
    );
    debug!(%routine, job_key = %key, "Derived ad-hoc full backup job");
    Some((
      JobDetail::new(recurring.job().clone(), key),
      Trigger::run_once(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::{Job, JobContext};
  use std::sync::Arc;

  struct NoopJob(&'static str);

  impl Job for NoopJob {
    fn execute(&self, _ctx: &JobContext) {}
    fn description(&self) -> String {
      self.0.to_string()
    }
  }

  fn detail(name: &str, group: JobGroup) -> JobDetail {
    JobDetail::new(Arc::new(NoopJob("noop")), JobKey::with_group(name, group))
  }

  #[test]
  fn put_replaces_existing() {
    let registry = JobRegistry::new();
    let key = JobKey::with_group("daily", JobGroup::Full);
    registry.put(key.clone(), detail("daily", JobGroup::Full));
    registry.put(
      key.clone(),
      JobDetail::new(Arc::new(NoopJob("replacement")), key.clone()),
    );
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(&key).unwrap().job().description(), "replacement");
  }

  #[test]
  fn adhoc_for_unknown_routine_is_none() {
    let registry = JobRegistry::new();
    assert!(registry.new_adhoc_full_backup_job("missing").is_none());

    // An incremental job alone is not enough.
    registry.put(
      JobKey::with_group("inc-only", JobGroup::Incremental),
      detail("inc-only", JobGroup::Incremental),
    );
    assert!(registry.new_adhoc_full_backup_job("inc-only").is_none());
  }

  #[test]
  fn adhoc_shares_job_under_fresh_key() {
    let registry = JobRegistry::new();
    let recurring = detail("daily", JobGroup::Full);
    registry.put(recurring.key().clone(), recurring.clone());

    let (adhoc, trigger) = registry.new_adhoc_full_backup_job("daily").unwrap();
    assert!(Arc::ptr_eq(adhoc.job(), recurring.job()));
    assert_ne!(adhoc.key(), recurring.key());
    assert_eq!(adhoc.key().group(), Some(JobGroup::Full));
    assert!(adhoc.key().name().starts_with("daily-adhoc-"));
    assert!(matches!(trigger, Trigger::RunOnce(ref once) if once.delay().is_zero()));
    // Derivation does not register anything.
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn back_to_back_adhoc_keys_differ() {
    let registry = JobRegistry::new();
    let recurring = detail("daily", JobGroup::Full);
    registry.put(recurring.key().clone(), recurring);

    let (first, _) = registry.new_adhoc_full_backup_job("daily").unwrap();
    let (second, _) = registry.new_adhoc_full_backup_job("daily").unwrap();
    assert_ne!(first.key(), second.key());
  }

  #[test]
  fn clear_empties() {
    let registry = JobRegistry::new();
    registry.put(JobKey::with_group("a", JobGroup::Full), detail("a", JobGroup::Full));
    registry.put(JobKey::with_group("b", JobGroup::Full), detail("b", JobGroup::Full));
    assert_eq!(
      registry.keys(),
      vec![
        JobKey::with_group("a", JobGroup::Full),
        JobKey::with_group("b", JobGroup::Full)
      ]
    );
    registry.clear();
    assert!(registry.is_empty());
  }
}
