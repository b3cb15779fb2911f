use crate::command::CoordinatorCommand;
use crate::coordinator::{Coordinator, CoordinatorState};
use crate::error::{SchedulerError, ShutdownError};
use crate::job::{JobDetail, JobKey, ScheduledJobInfo};
use crate::metrics::{MetricsSnapshot, SchedulerMetrics};
use crate::registry::JobRegistry;
use crate::trigger::Trigger;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_COMMAND_BOUND: usize = 128;

/// Builder for configuring and creating a [`Scheduler`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use backup_scheduler::{JobRegistry, Scheduler};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Arc::new(JobRegistry::new());
/// let scheduler = Scheduler::builder()
///     .command_buffer_size(256)
///     .registry(registry.clone())
///     .build();
/// scheduler.start(CancellationToken::new())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SchedulerBuilder {
  command_buffer_size: usize,
  registry: Option<Arc<JobRegistry>>,
  metrics: Option<SchedulerMetrics>,
}

impl Default for SchedulerBuilder {
  fn default() -> Self {
    Self {
      command_buffer_size: DEFAULT_COMMAND_BOUND,
      registry: None,
      metrics: None,
    }
  }
}

impl SchedulerBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the size of the internal buffer for commands (registrations, clears, queries).
  pub fn command_buffer_size(mut self, size: usize) -> Self {
    self.command_buffer_size = size.max(1);
    self
  }

  /// Injects the registry the scheduler owns. A fresh one is created otherwise.
  pub fn registry(mut self, registry: Arc<JobRegistry>) -> Self {
    self.registry = Some(registry);
    self
  }

  /// Injects the metrics the scheduler and its jobs report into.
  pub fn metrics(mut self, metrics: SchedulerMetrics) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Builds a scheduler. Nothing runs until [`Scheduler::start`] is called.
  pub fn build(self) -> Scheduler {
    let (cmd_tx, cmd_rx) = mpsc::channel::<CoordinatorCommand>(self.command_buffer_size);
    Scheduler {
      registry: self.registry.unwrap_or_default(),
      metrics: self.metrics.unwrap_or_default(),
      cmd_tx,
      pending_cmd_rx: Mutex::new(Some(cmd_rx)),
      running: Mutex::new(None),
    }
  }
}

#[derive(Debug)]
struct RunningState {
  cancel: CancellationToken,
  handle: JoinHandle<()>,
}

/// Handle to the time-driven dispatcher.
///
/// Holds every registered (job, trigger) pair, fires jobs when their triggers
/// elapse, and owns the [`JobRegistry`] used for ad-hoc job derivation. All
/// registration and query methods talk to the dispatch loop over a command
/// channel and therefore require [`Scheduler::start`] to have been called.
#[derive(Debug)]
pub struct Scheduler {
  registry: Arc<JobRegistry>,
  metrics: SchedulerMetrics,
  cmd_tx: mpsc::Sender<CoordinatorCommand>,
  pending_cmd_rx: Mutex<Option<mpsc::Receiver<CoordinatorCommand>>>,
  running: Mutex<Option<RunningState>>,
}

impl Default for Scheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl Scheduler {
  /// Creates an unstarted scheduler with default settings.
  pub fn new() -> Self {
    SchedulerBuilder::new().build()
  }

  pub fn builder() -> SchedulerBuilder {
    SchedulerBuilder::new()
  }

  /// Spawns the dispatch loop on the current Tokio runtime.
  ///
  /// The loop stops when `cancel` (or the internal child token used by
  /// [`Scheduler::shutdown`]) is cancelled. Jobs already executing are never
  /// interrupted.
  ///
  /// # Errors
  ///
  /// [`SchedulerError::AlreadyStarted`] if called more than once.
  ///
  /// # Panics
  ///
  /// Panics if called outside a Tokio runtime.
  pub fn start(&self, cancel: CancellationToken) -> Result<(), SchedulerError> {
    let cmd_rx = self
      .pending_cmd_rx
      .lock()
      .take()
      .ok_or(SchedulerError::AlreadyStarted)?;

    let cancel = cancel.child_token();
    let state = CoordinatorState::new(
      cmd_rx,
      cancel.clone(),
      self.registry.clone(),
      self.metrics.clone(),
    );
    let handle = tokio::spawn(async move {
      let mut coordinator = Coordinator::new(state);
      coordinator.run().await;
    });

    *self.running.lock() = Some(RunningState { cancel, handle });
    info!("Scheduler started.");
    Ok(())
  }

  pub fn is_started(&self) -> bool {
    self.pending_cmd_rx.lock().is_none()
  }

  /// `true` while the dispatch loop is alive.
  pub fn is_running(&self) -> bool {
    self
      .running
      .lock()
      .as_ref()
      .is_some_and(|state| !state.handle.is_finished())
  }

  /// The registry owned by this scheduler.
  pub fn registry(&self) -> &Arc<JobRegistry> {
    &self.registry
  }

  /// The metrics handle shared with the dispatch loop and backup jobs.
  pub fn metrics(&self) -> &SchedulerMetrics {
    &self.metrics
  }

  pub fn metrics_snapshot(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }

  /// Registers `detail` to fire according to `trigger`.
  ///
  /// # Errors
  ///
  /// - [`SchedulerError::JobAlreadyExists`]: a job with the same key is registered.
  /// - [`SchedulerError::InvalidTrigger`]: the trigger yields no first fire time.
  /// - [`SchedulerError::NotStarted`] / [`SchedulerError::SchedulerShutdown`] /
  ///   [`SchedulerError::ResponseFailed`]: the dispatch loop is not available.
  pub async fn schedule_job(&self, detail: JobDetail, trigger: Trigger) -> Result<(), SchedulerError> {
    self
      .request(|responder| CoordinatorCommand::ScheduleJob {
        detail,
        trigger,
        responder,
      })
      .await?
  }

  /// Removes a single job; its trigger never fires again.
  pub async fn delete_job(&self, key: JobKey) -> Result<(), SchedulerError> {
    self
      .request(|responder| CoordinatorCommand::DeleteJob { key, responder })
      .await?
  }

  /// Removes every registered job and empties the registry.
  ///
  /// Previously registered triggers never fire again once this returns; jobs
  /// already executing run to completion.
  pub async fn clear(&self) -> Result<(), SchedulerError> {
    self
      .request(|responder| CoordinatorCommand::Clear { responder })
      .await?
  }

  /// Keys of every registered job, sorted.
  pub async fn job_keys(&self) -> Result<Vec<JobKey>, SchedulerError> {
    self
      .request(|responder| CoordinatorCommand::GetJobKeys { responder })
      .await
  }

  pub async fn scheduled_job(&self, key: JobKey) -> Result<ScheduledJobInfo, SchedulerError> {
    self
      .request(|responder| CoordinatorCommand::GetScheduledJob { key, responder })
      .await?
  }

  /// Stops the dispatch loop and waits for in-flight jobs to finish.
  ///
  /// # Errors
  ///
  /// - [`ShutdownError::NotRunning`]: never started, or already shut down.
  /// - [`ShutdownError::Timeout`]: `timeout` elapsed first. Jobs keep running detached.
  /// - [`ShutdownError::TaskPanic`]: the dispatch loop panicked.
  pub async fn shutdown(&self, timeout: Option<Duration>) -> Result<(), ShutdownError> {
    let RunningState { cancel, handle } = self
      .running
      .lock()
      .take()
      .ok_or(ShutdownError::NotRunning)?;

    info!("Initiating scheduler shutdown...");
    cancel.cancel();

    let joined = match timeout {
      Some(timeout) => match tokio::time::timeout(timeout, handle).await {
        Ok(joined) => joined,
        Err(_) => {
          error!("Shutdown timed out after {:?}", timeout);
          return Err(ShutdownError::Timeout);
        }
      },
      None => handle.await,
    };

    match joined {
      Ok(()) => {
        info!("Scheduler shut down.");
        Ok(())
      }
      Err(e) => {
        error!("Dispatch loop panicked: {:?}", e);
        Err(ShutdownError::TaskPanic)
      }
    }
  }

  /// Sends a command and awaits the dispatch loop's answer.
  async fn request<T>(
    &self,
    command: impl FnOnce(oneshot::Sender<T>) -> CoordinatorCommand,
  ) -> Result<T, SchedulerError> {
    if !self.is_started() {
      warn!("Command issued to a scheduler that was never started.");
      return Err(SchedulerError::NotStarted);
    }
    let (responder, response_rx) = oneshot::channel();
    self
      .cmd_tx
      .send(command(responder))
      .await
      .map_err(|_| SchedulerError::SchedulerShutdown)?;
    response_rx.await.map_err(|_| SchedulerError::ResponseFailed)
  }
}
