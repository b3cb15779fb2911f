//! Storage backend bindings and routine handler construction.

use crate::config::BackupConfig;
use crate::error::HandlerError;
use crate::job::backup::RoutineHandler;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Builds the collaborators the scheduler needs for each routine.
///
/// Implemented by the backup service that owns the actual backup engine.
pub trait HandlerFactory: Send + Sync + 'static {
  /// Storage backend bound to a routine.
  type Backend: Send + Sync + 'static;

  /// Builds one backend per routine of `config`, keyed by routine name.
  fn build_backends(&self, config: &BackupConfig) -> HashMap<String, Arc<Self::Backend>>;

  /// Builds the handler for `routine_name`. `backend` is `None` if no backend is
  /// bound to the routine.
  fn new_handler(
    &self,
    config: &BackupConfig,
    routine_name: &str,
    backend: Option<Arc<Self::Backend>>,
  ) -> Result<Arc<dyn RoutineHandler>, HandlerError>;
}

/// Thread-safe routine name → backend binding, swapped wholesale on reconfiguration.
#[derive(Debug)]
pub struct BackendsHolder<B> {
  data: RwLock<HashMap<String, Arc<B>>>,
}

impl<B> Default for BackendsHolder<B> {
  fn default() -> Self {
    Self {
      data: RwLock::new(HashMap::new()),
    }
  }
}

impl<B> BackendsHolder<B> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_data(data: HashMap<String, Arc<B>>) -> Self {
    Self {
      data: RwLock::new(data),
    }
  }

  pub fn get(&self, routine_name: &str) -> Option<Arc<B>> {
    self.data.read().get(routine_name).cloned()
  }

  /// Replaces every binding.
  pub fn set_data(&self, data: HashMap<String, Arc<B>>) {
    *self.data.write() = data;
  }

  pub fn len(&self) -> usize {
    self.data.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.read().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn set_data_replaces_bindings() {
    let holder = BackendsHolder::from_data(HashMap::from([
      ("daily".to_string(), Arc::new(1u32)),
      ("weekly".to_string(), Arc::new(2u32)),
    ]));
    assert_eq!(holder.get("weekly").as_deref(), Some(&2));

    holder.set_data(HashMap::from([("hourly".to_string(), Arc::new(3u32))]));
    assert_eq!(holder.len(), 1);
    assert!(holder.get("weekly").is_none());
    assert_eq!(holder.get("hourly").as_deref(), Some(&3));
  }
}
