use crate::error::SchedulerError;
use crate::job::{JobDetail, JobKey, ScheduledJobInfo};
use crate::trigger::Trigger;

use tokio::sync::oneshot;

/// Commands sent from the [`Scheduler`](crate::Scheduler) handle to the dispatch loop.
///
/// Each command carries a `oneshot::Sender` the dispatch loop answers on.
#[derive(Debug)]
pub(crate) enum CoordinatorCommand {
  /// Register a job with its trigger.
  ScheduleJob {
    detail: JobDetail,
    trigger: Trigger,
    responder: oneshot::Sender<Result<(), SchedulerError>>,
  },
  /// Remove a single registered job.
  DeleteJob {
    key: JobKey,
    responder: oneshot::Sender<Result<(), SchedulerError>>,
  },
  /// Remove every registered job.
  Clear {
    responder: oneshot::Sender<Result<(), SchedulerError>>,
  },
  /// Keys of every registered job.
  GetJobKeys {
    responder: oneshot::Sender<Vec<JobKey>>,
  },
  /// Details of one registered job.
  GetScheduledJob {
    key: JobKey,
    responder: oneshot::Sender<Result<ScheduledJobInfo, SchedulerError>>,
  },
}
