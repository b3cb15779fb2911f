//! Backup configuration model consumed by the routine scheduler.
//!
//! Only the parts the scheduler reads are modelled in detail; policies and
//! storage are carried through for [`HandlerFactory`](crate::backend::HandlerFactory)
//! implementations.

use std::collections::BTreeMap;

/// The full backup service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct BackupConfig {
  /// Routines keyed by their unique name.
  pub backup_routines: BTreeMap<String, BackupRoutine>,
  pub backup_policies: BTreeMap<String, BackupPolicy>,
  pub storage: BTreeMap<String, Storage>,
}

impl BackupConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Adds or replaces a routine (builder style).
  pub fn with_routine(mut self, name: impl Into<String>, routine: BackupRoutine) -> Self {
    self.backup_routines.insert(name.into(), routine);
    self
  }

  pub fn with_policy(mut self, name: impl Into<String>, policy: BackupPolicy) -> Self {
    self.backup_policies.insert(name.into(), policy);
    self
  }

  pub fn with_storage(mut self, name: impl Into<String>, storage: Storage) -> Self {
    self.storage.insert(name.into(), storage);
    self
  }

  pub fn routine(&self, name: &str) -> Option<&BackupRoutine> {
    self.backup_routines.get(name)
  }
}

/// A named, independently scheduled backup target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct BackupRoutine {
  /// Name of the [`BackupPolicy`] applied to every run.
  pub backup_policy: String,
  /// Name of the cluster being backed up.
  pub source_cluster: String,
  /// Name of the [`Storage`] the backups are written to.
  pub storage: String,
  /// Cron expression for full backups.
  pub interval_cron: String,
  /// Cron expression for incremental backups. Empty disables incrementals.
  pub incr_interval_cron: String,
  /// Namespaces to back up; empty means all.
  pub namespaces: Vec<String>,
}

impl BackupRoutine {
  /// A routine with the given full-backup cron and no incrementals.
  pub fn new(interval_cron: impl Into<String>) -> Self {
    Self {
      interval_cron: interval_cron.into(),
      ..Self::default()
    }
  }

  pub fn with_incremental(mut self, incr_interval_cron: impl Into<String>) -> Self {
    self.incr_interval_cron = incr_interval_cron.into();
    self
  }

  pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
    self.backup_policy = policy.into();
    self
  }

  pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
    self.storage = storage.into();
    self
  }

  pub fn with_source_cluster(mut self, cluster: impl Into<String>) -> Self {
    self.source_cluster = cluster.into();
    self
  }

  /// The incremental cron expression, if incrementals are enabled.
  pub fn incremental_cron(&self) -> Option<&str> {
    let trimmed = self.incr_interval_cron.trim();
    (!trimmed.is_empty()).then_some(trimmed)
  }
}

/// Execution parameters of a backup. Interpreted by the backup engine only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct BackupPolicy {
  pub parallel: Option<u32>,
  pub max_retries: Option<u32>,
  /// Delay between engine-level retries, in milliseconds.
  pub retry_delay: Option<u64>,
  pub sealed: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageType {
  #[default]
  #[cfg_attr(feature = "serde", serde(rename = "local"))]
  Local,
  #[cfg_attr(feature = "serde", serde(rename = "aws-s3"))]
  AwsS3,
}

/// Where backups of a routine are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case", default))]
pub struct Storage {
  #[cfg_attr(feature = "serde", serde(rename = "type"))]
  pub storage_type: StorageType,
  pub path: String,
  pub s3_region: Option<String>,
}

impl Storage {
  pub fn local(path: impl Into<String>) -> Self {
    Self {
      storage_type: StorageType::Local,
      path: path.into(),
      s3_region: None,
    }
  }
}
