use super::{InstanceId, JobKey};

use chrono::{DateTime, Utc};

/// Information about the firing that invoked [`Job::execute`](super::Job::execute).
#[derive(Debug, Clone)]
pub struct JobContext {
  /// Key under which the fired job is registered.
  pub key: JobKey,
  /// Unique ID of this specific firing.
  pub instance_id: InstanceId,
  /// The instant the trigger was due.
  pub fire_time: DateTime<Utc>,
}

impl JobContext {
  pub fn new(key: JobKey, fire_time: DateTime<Utc>) -> Self {
    Self {
      key,
      instance_id: InstanceId::new_v4(),
      fire_time,
    }
  }
}
