//! Single-flight protection for job executions.

use std::sync::atomic::{AtomicBool, Ordering};

/// Lock-free flag ensuring at most one execution of a job is in progress.
///
/// Acquisition never waits: if the flag is already set the caller is expected
/// to skip its execution.
#[derive(Debug, Default)]
pub struct RunGuard {
  running: AtomicBool,
}

impl RunGuard {
  pub fn new() -> Self {
    Self::default()
  }

  /// Atomically flips the flag from `false` to `true`.
  ///
  /// Returns `None` if another execution already holds it.
  pub fn try_acquire(&self) -> Option<RunPermit<'_>> {
    self
      .running
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| RunPermit { guard: self })
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }
}

/// Clears the owning [`RunGuard`] when dropped, including during a panic unwind.
#[derive(Debug)]
pub struct RunPermit<'a> {
  guard: &'a RunGuard,
}

impl Drop for RunPermit<'_> {
  fn drop(&mut self) {
    self.guard.running.store(false, Ordering::Release);
  }
}
