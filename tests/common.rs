//! tests/common.rs
//! Shared helper functions for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use backup_scheduler::{
  BackendsHolder, BackupConfig, HandlerError, HandlerFactory, Job, JobContext, RoutineHandler,
  RoutineScheduler,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

// Initializes tracing subscriber for test output.
pub fn setup_tracing() {
  // Use try_init to avoid panic if called multiple times
  let _ = tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_test_writer()
    .try_init();
}

// Polls `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_for(timeout: StdDuration, condition: impl Fn() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    tokio::time::sleep(StdDuration::from_millis(10)).await;
  }
  condition()
}

// --- Fake backup engine ---

// Records every backup it is asked to run; optionally blocks each run for `delay`.
pub struct FakeHandler {
  name: String,
  last_full_run: Option<DateTime<Utc>>,
  delay: StdDuration,
  pub full_runs: AtomicUsize,
  pub incremental_runs: AtomicUsize,
}

impl FakeHandler {
  pub fn new(name: &str, last_full_run: Option<DateTime<Utc>>) -> Self {
    Self {
      name: name.to_string(),
      last_full_run,
      delay: StdDuration::ZERO,
      full_runs: AtomicUsize::new(0),
      incremental_runs: AtomicUsize::new(0),
    }
  }

  pub fn full_runs(&self) -> usize {
    self.full_runs.load(Ordering::SeqCst)
  }

  pub fn incremental_runs(&self) -> usize {
    self.incremental_runs.load(Ordering::SeqCst)
  }
}

impl RoutineHandler for FakeHandler {
  fn routine_name(&self) -> &str {
    &self.name
  }

  fn run_full_backup(&self, now: DateTime<Utc>) {
    let count = self.full_runs.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::debug!(routine = %self.name, %now, count, "Fake full backup executing");
    if self.delay > StdDuration::ZERO {
      std::thread::sleep(self.delay);
    }
  }

  fn run_incremental_backup(&self, now: DateTime<Utc>) {
    let count = self.incremental_runs.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::debug!(routine = %self.name, %now, count, "Fake incremental backup executing");
    if self.delay > StdDuration::ZERO {
      std::thread::sleep(self.delay);
    }
  }

  fn last_full_run(&self) -> Option<DateTime<Utc>> {
    self.last_full_run
  }
}

// Storage backend stand-in: remembers which configuration generation built it.
#[derive(Debug, PartialEq, Eq)]
pub struct FakeBackend {
  pub routine: String,
  pub generation: usize,
}

// Builds `FakeHandler`s and keeps them around for inspection.
#[derive(Default)]
pub struct FakeFactory {
  last_full_runs: Mutex<HashMap<String, DateTime<Utc>>>,
  failing: Mutex<HashSet<String>>,
  run_delay: Mutex<StdDuration>,
  generation: AtomicUsize,
  handlers: Mutex<HashMap<String, Arc<FakeHandler>>>,
  backends_seen: Mutex<HashMap<String, Option<Arc<FakeBackend>>>>,
}

impl FakeFactory {
  pub fn new() -> Self {
    Self::default()
  }

  // Handlers built for `routine` report `last` as their last full backup.
  pub fn with_last_full_run(self, routine: &str, last: DateTime<Utc>) -> Self {
    self.last_full_runs.lock().insert(routine.to_string(), last);
    self
  }

  // Handler construction for `routine` fails.
  pub fn with_failing(self, routine: &str) -> Self {
    self.failing.lock().insert(routine.to_string());
    self
  }

  // Every fake backup blocks its thread for `delay`.
  pub fn with_run_delay(self, delay: StdDuration) -> Self {
    *self.run_delay.lock() = delay;
    self
  }

  // The most recent handler built for `routine`.
  pub fn handler(&self, routine: &str) -> Option<Arc<FakeHandler>> {
    self.handlers.lock().get(routine).cloned()
  }

  // The backend passed to the most recent `new_handler` call for `routine`.
  pub fn backend_seen(&self, routine: &str) -> Option<Arc<FakeBackend>> {
    self.backends_seen.lock().get(routine).cloned().flatten()
  }
}

impl HandlerFactory for FakeFactory {
  type Backend = FakeBackend;

  fn build_backends(&self, config: &BackupConfig) -> HashMap<String, Arc<FakeBackend>> {
    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
    config
      .backup_routines
      .keys()
      .map(|name| {
        (
          name.clone(),
          Arc::new(FakeBackend {
            routine: name.clone(),
            generation,
          }),
        )
      })
      .collect()
  }

  fn new_handler(
    &self,
    _config: &BackupConfig,
    routine_name: &str,
    backend: Option<Arc<FakeBackend>>,
  ) -> Result<Arc<dyn RoutineHandler>, HandlerError> {
    if self.failing.lock().contains(routine_name) {
      return Err(HandlerError::Construction {
        routine: routine_name.to_string(),
        reason: "forced failure".to_string(),
      });
    }
    self
      .backends_seen
      .lock()
      .insert(routine_name.to_string(), backend);

    let mut handler = FakeHandler::new(
      routine_name,
      self.last_full_runs.lock().get(routine_name).copied(),
    );
    handler.delay = *self.run_delay.lock();
    let handler = Arc::new(handler);
    self
      .handlers
      .lock()
      .insert(routine_name.to_string(), handler.clone());
    Ok(handler)
  }
}

// Builds a routine scheduler over `factory` with backends already bound for `config`.
pub fn routine_scheduler(
  factory: Arc<FakeFactory>,
  config: &BackupConfig,
  catch_up_delay: StdDuration,
) -> RoutineScheduler<FakeFactory> {
  let backends = Arc::new(BackendsHolder::from_data(factory.build_backends(config)));
  RoutineScheduler::new(factory, backends).with_catch_up_delay(catch_up_delay)
}

// --- Plain jobs for dispatcher tests ---

// Increments a counter on every execution, optionally blocking for `delay`.
pub struct CountingJob {
  pub counter: Arc<AtomicUsize>,
  pub delay: StdDuration,
}

impl CountingJob {
  pub fn new(counter: Arc<AtomicUsize>) -> Self {
    Self {
      counter,
      delay: StdDuration::ZERO,
    }
  }

  pub fn with_delay(counter: Arc<AtomicUsize>, delay: StdDuration) -> Self {
    Self { counter, delay }
  }
}

impl Job for CountingJob {
  fn execute(&self, ctx: &JobContext) {
    let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::debug!(job_key = %ctx.key, count, "Counting job executing");
    if self.delay > StdDuration::ZERO {
      std::thread::sleep(self.delay);
    }
  }

  fn description(&self) -> String {
    "counting job".to_string()
  }
}

// A job that panics on every execution.
pub struct PanickingJob;

impl Job for PanickingJob {
  fn execute(&self, _ctx: &JobContext) {
    panic!("Job forced panic!");
  }

  fn description(&self) -> String {
    "panicking job".to_string()
  }
}
