use crate::command::CoordinatorCommand;
use crate::error::SchedulerError;
use crate::job::{JobContext, JobDetail, JobKey, ScheduledJobInfo};
use crate::metrics::SchedulerMetrics;
use crate::registry::JobRegistry;
use crate::trigger::Trigger;

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use priority_queue::PriorityQueue;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn};

/// Upper bound for a single timer sleep. Bounds how long a wall-clock jump can
/// delay a firing.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Inputs owned by the dispatch loop.
#[derive(Debug)]
pub(crate) struct CoordinatorState {
  cmd_rx: mpsc::Receiver<CoordinatorCommand>,
  cancel: CancellationToken,
  registry: Arc<JobRegistry>,
  metrics: SchedulerMetrics,
}

impl CoordinatorState {
  pub fn new(
    cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    cancel: CancellationToken,
    registry: Arc<JobRegistry>,
    metrics: SchedulerMetrics,
  ) -> Self {
    Self {
      cmd_rx,
      cancel,
      registry,
      metrics,
    }
  }
}

/// A registered (job, trigger) pair and its pending fire time.
#[derive(Debug)]
struct ScheduledJob {
  detail: JobDetail,
  trigger: Trigger,
  next_fire_time: DateTime<Utc>,
}

/// The time-driven dispatch loop behind a [`Scheduler`](crate::Scheduler).
///
/// Owns every registration. Jobs are ordered by next fire time in a priority
/// queue keyed by [`JobKey`], so each key has at most one pending firing.
pub(crate) struct Coordinator {
  state: CoordinatorState,
  jobs: HashMap<JobKey, ScheduledJob>,
  queue: PriorityQueue<JobKey, Reverse<DateTime<Utc>>>,
  in_flight: JoinSet<()>,
}

impl Coordinator {
  pub fn new(state: CoordinatorState) -> Self {
    Self {
      state,
      jobs: HashMap::new(),
      queue: PriorityQueue::new(),
      in_flight: JoinSet::new(),
    }
  }

  /// Runs the main event loop until cancelled or until the scheduler handle is dropped.
  pub async fn run(&mut self) {
    info!("Dispatch loop started.");

    loop {
      self.update_gauge_metrics();
      let sleep_duration = self.calculate_sleep();

      tokio::select! {
          biased;

          _ = self.state.cancel.cancelled() => {
              info!("Dispatch loop received cancellation.");
              break;
          }

          maybe_cmd = self.state.cmd_rx.recv() => {
              match maybe_cmd {
                  Some(cmd) => self.handle_command(cmd),
                  None => {
                      warn!("Command channel closed (scheduler handle dropped). Stopping dispatch loop.");
                      break;
                  }
              }
          }

          Some(result) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
              self.handle_finished(result);
          }

          _ = sleep(sleep_duration) => {
              trace!("Timer fired.");
              self.fire_due_jobs();
          }
      }
    }

    // No new registrations or firings from here on.
    self.state.cmd_rx.close();
    if !self.in_flight.is_empty() {
      info!(
        in_flight = self.in_flight.len(),
        "Waiting for in-flight jobs to complete."
      );
    }
    while let Some(result) = self.in_flight.join_next().await {
      self.handle_finished(result);
    }
    self.update_gauge_metrics();
    info!("Dispatch loop stopped.");
  }

  fn update_gauge_metrics(&self) {
    self
      .state
      .metrics
      .jobs_registered_current
      .store(self.jobs.len(), AtomicOrdering::Relaxed);
  }

  /// Time until the earliest pending fire time, zero if it is already due.
  fn calculate_sleep(&self) -> Duration {
    match self.queue.peek() {
      Some((_, Reverse(next_fire_time))) => {
        let now = Utc::now();
        if *next_fire_time <= now {
          Duration::ZERO
        } else {
          (*next_fire_time - now)
            .to_std()
            .map(|d| d.min(MAX_SLEEP))
            .unwrap_or(MAX_SLEEP)
        }
      }
      None => MAX_SLEEP,
    }
  }

  /// Fires every job whose fire time has elapsed and reschedules it.
  fn fire_due_jobs(&mut self) {
    let now = Utc::now();

    while let Some((key, fire_time)) = self
      .queue
      .peek()
      .map(|(key, Reverse(fire_time))| (key.clone(), *fire_time))
    {
      if fire_time > now {
        break;
      }
      self.queue.pop();

      let (detail, next) = match self.jobs.get_mut(&key) {
        Some(entry) => {
          let next = entry.trigger.next_fire_time(now);
          if let Ok(next_fire_time) = next {
            entry.next_fire_time = next_fire_time;
          }
          (entry.detail.clone(), next)
        }
        None => {
          warn!(job_key = %key, "Queued job has no registration, discarding.");
          continue;
        }
      };

      self.dispatch(detail, fire_time);

      match next {
        Ok(next_fire_time) => {
          trace!(job_key = %key, next_fire = %next_fire_time, "Rescheduled job.");
          self.queue.push(key, Reverse(next_fire_time));
        }
        Err(e) => {
          debug!(job_key = %key, reason = %e, "Trigger has no further fire time, removing job.");
          self.jobs.remove(&key);
        }
      }
    }
  }

  /// Runs the job on its own blocking task.
  fn dispatch(&mut self, detail: JobDetail, fire_time: DateTime<Utc>) {
    let ctx = JobContext::new(detail.key().clone(), fire_time);
    let metrics = self.state.metrics.clone();
    metrics.jobs_fired.fetch_add(1, AtomicOrdering::Relaxed);
    metrics
      .jobs_running_current
      .fetch_add(1, AtomicOrdering::Relaxed);

    let job_span = info_span!(
      "job_exec",
      job_key = %ctx.key,
      instance_id = %ctx.instance_id
    );

    self.in_flight.spawn_blocking(move || {
      let _entered = job_span.enter();
      let started = Instant::now();
      debug!(
        job = %detail.job().description(),
        fire_time = %ctx.fire_time,
        "Starting job execution."
      );
      detail.job().execute(&ctx);
      let duration = started.elapsed();
      metrics.job_execution_duration.record(duration);
      debug!(duration_ms = duration.as_millis() as u64, "Finished job execution.");
    });
  }

  fn handle_finished(&self, result: Result<(), JoinError>) {
    self
      .state
      .metrics
      .jobs_running_current
      .fetch_sub(1, AtomicOrdering::Relaxed);

    if let Err(join_error) = result {
      if join_error.is_panic() {
        error!(error = %join_error, "Job execution panicked!");
        self
          .state
          .metrics
          .jobs_panicked
          .fetch_add(1, AtomicOrdering::Relaxed);
      } else {
        warn!(error = %join_error, "Job task was cancelled during execution.");
      }
    }
  }

  fn handle_command(&mut self, cmd: CoordinatorCommand) {
    match cmd {
      CoordinatorCommand::ScheduleJob {
        detail,
        trigger,
        responder,
      } => {
        let _ = responder.send(self.schedule_job(detail, trigger));
      }
      CoordinatorCommand::DeleteJob { key, responder } => {
        let response = match self.jobs.remove(&key) {
          Some(_) => {
            self.queue.remove(&key);
            self.state.registry.remove(&key);
            info!(job_key = %key, "Deleted job.");
            Ok(())
          }
          None => Err(SchedulerError::JobNotFound(key)),
        };
        let _ = responder.send(response);
      }
      CoordinatorCommand::Clear { responder } => {
        let removed = self.jobs.len();
        self.jobs.clear();
        self.queue.clear();
        self.state.registry.clear();
        self
          .state
          .metrics
          .schedule_clears
          .fetch_add(1, AtomicOrdering::Relaxed);
        info!(
          removed,
          in_flight = self.in_flight.len(),
          "Cleared all scheduled jobs."
        );
        let _ = responder.send(Ok(()));
      }
      CoordinatorCommand::GetJobKeys { responder } => {
        let mut keys: Vec<JobKey> = self.jobs.keys().cloned().collect();
        keys.sort();
        let _ = responder.send(keys);
      }
      CoordinatorCommand::GetScheduledJob { key, responder } => {
        let response = self
          .jobs
          .get(&key)
          .map(|entry| ScheduledJobInfo {
            key: key.clone(),
            description: entry.detail.job().description(),
            trigger: entry.trigger.description(),
            next_fire_time: entry.next_fire_time,
          })
          .ok_or(SchedulerError::JobNotFound(key));
        let _ = responder.send(response);
      }
    }
  }

  fn schedule_job(&mut self, detail: JobDetail, mut trigger: Trigger) -> Result<(), SchedulerError> {
    let key = detail.key().clone();
    if self.jobs.contains_key(&key) {
      warn!(job_key = %key, "Rejected duplicate job registration.");
      return Err(SchedulerError::JobAlreadyExists(key));
    }

    let next_fire_time = trigger
      .next_fire_time(Utc::now())
      .map_err(|source| SchedulerError::InvalidTrigger {
        key: key.clone(),
        source,
      })?;

    debug!(
      job_key = %key,
      trigger = %trigger.description(),
      next_fire = %next_fire_time,
      "Scheduled job."
    );
    self.queue.push(key.clone(), Reverse(next_fire_time));
    self.jobs.insert(
      key,
      ScheduledJob {
        detail,
        trigger,
        next_fire_time,
      },
    );
    self
      .state
      .metrics
      .jobs_scheduled
      .fetch_add(1, AtomicOrdering::Relaxed);
    Ok(())
  }
}
