pub mod backup;
pub mod context;
pub mod guard;

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

pub use context::JobContext;

// --- Public Type Aliases ---

/// Unique identifier of a single firing of a job. Uses UUID v4.
pub type InstanceId = Uuid;

// --- Job Identity ---

/// The two job families scheduled per backup routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum JobGroup {
  Full,
  Incremental,
}

impl JobGroup {
  pub fn as_str(&self) -> &'static str {
    match self {
      JobGroup::Full => "full",
      JobGroup::Incremental => "incremental",
    }
  }
}

impl fmt::Display for JobGroup {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Unique identity of a scheduled job: a name plus an optional group.
///
/// Keys without a group belong to the default group. Displayed as `group::name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobKey {
  name: String,
  group: Option<JobGroup>,
}

impl JobKey {
  pub const DEFAULT_GROUP: &'static str = "default";

  /// A key in the default group.
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      group: None,
    }
  }

  pub fn with_group(name: impl Into<String>, group: JobGroup) -> Self {
    Self {
      name: name.into(),
      group: Some(group),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn group(&self) -> Option<JobGroup> {
    self.group
  }
}

impl fmt::Display for JobKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.group {
      Some(group) => write!(f, "{}::{}", group, self.name),
      None => write!(f, "{}::{}", Self::DEFAULT_GROUP, self.name),
    }
  }
}

// --- Runnable Jobs ---

/// A unit of work the [`Scheduler`](crate::Scheduler) runs when a trigger fires.
///
/// `execute` is synchronous and is always invoked on a blocking task, so it may
/// perform long-running I/O. It reports nothing back: failures are the job's
/// own business to log.
pub trait Job: Send + Sync + 'static {
  fn execute(&self, ctx: &JobContext);

  /// Human-readable label, used only for diagnostics.
  fn description(&self) -> String;
}

/// Immutable pairing of a runnable [`Job`] and its [`JobKey`].
#[derive(Clone)]
pub struct JobDetail {
  job: Arc<dyn Job>,
  key: JobKey,
}

impl JobDetail {
  pub fn new(job: Arc<dyn Job>, key: JobKey) -> Self {
    Self { job, key }
  }

  pub fn job(&self) -> &Arc<dyn Job> {
    &self.job
  }

  pub fn key(&self) -> &JobKey {
    &self.key
  }
}

// Manual Debug, the job itself is opaque.
impl fmt::Debug for JobDetail {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobDetail")
      .field("key", &self.key)
      .field("job", &format_args!("{}", self.job.description()))
      .finish()
  }
}

// --- Public Snapshot Structs for Querying ---

/// Information about a job currently registered with the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduledJobInfo {
  pub key: JobKey,
  /// The job's `description()`.
  pub description: String,
  /// The trigger's `description()`.
  pub trigger: String,
  pub next_fire_time: chrono::DateTime<chrono::Utc>,
}
