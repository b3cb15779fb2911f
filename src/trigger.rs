//! Fire-time computation for scheduled jobs.
//!
//! A [`Trigger`] is either a recurring [`CronTrigger`] or a [`RunOnceTrigger`]
//! that fires a single time and then expires.

use crate::error::TriggerError;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cron::Schedule as CronSchedule;

/// A recurring trigger backed by a cron expression.
///
/// Both the classic 5-field form (`min hour dom month dow`) and the 6/7-field
/// form with a leading seconds field (and optional trailing year) are accepted.
/// In the 5-field form days of the week are numbered 0-7 with Sunday as 0 or 7;
/// in the 6/7-field form they are numbered 1-7 with Sunday as 1.
///
/// Expressions are always evaluated in UTC, independent of the host time zone.
#[derive(Clone)]
pub struct CronTrigger {
  expression: String,
  schedule: CronSchedule,
}

impl CronTrigger {
  /// Parses `expression` into a trigger.
  ///
  /// # Errors
  ///
  /// Returns [`TriggerError::InvalidCronExpression`] if the expression is malformed.
  pub fn parse(expression: &str) -> Result<Self, TriggerError> {
    let trimmed = expression.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let normalized = match fields.as_slice() {
      // Minute-first form, fire at second zero.
      [minute, hour, day_of_month, month, day_of_week] => format!(
        "0 {} {} {} {} {}",
        minute,
        hour,
        day_of_month,
        month,
        normalize_day_of_week(day_of_week)
      ),
      _ => trimmed.to_string(),
    };
    let schedule =
      CronSchedule::from_str(&normalized).map_err(|e| TriggerError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: e.to_string(),
      })?;
    Ok(Self {
      expression: expression.to_string(),
      schedule,
    })
  }

  /// The expression as originally supplied.
  pub fn expression(&self) -> &str {
    &self.expression
  }

  /// Next fire time strictly after `since`.
  ///
  /// # Errors
  ///
  /// Returns [`TriggerError::NoNextFireTime`] if the schedule has no further occurrence
  /// (e.g. a year-bounded expression in the past).
  pub fn next_fire_time(&self, since: DateTime<Utc>) -> Result<DateTime<Utc>, TriggerError> {
    self
      .schedule
      .after(&since)
      .next()
      .ok_or_else(|| TriggerError::NoNextFireTime(self.expression.clone()))
  }
}

/// Rewrites a 0-7 (Sunday = 0 or 7) day-of-week field into the 1-7
/// (Sunday = 1) numbering of the second-first form.
///
/// Numeric items (`n`, `a-b`, `*/s`, `a-b/s`, `a/s`) are expanded into an
/// explicit list. Named days and anything unrecognised are passed through for
/// the cron parser to accept or reject.
fn normalize_day_of_week(field: &str) -> String {
  if field == "*" || field == "?" {
    return field.to_string();
  }

  let mut days = BTreeSet::new();
  let mut passthrough = Vec::new();
  for item in field.split(',') {
    match day_of_week_item(item) {
      Some(item_days) => days.extend(item_days),
      None => passthrough.push(item.to_string()),
    }
  }

  days
    .into_iter()
    .map(|day| day.to_string())
    .chain(passthrough)
    .collect::<Vec<_>>()
    .join(",")
}

/// Days (1-7, Sunday = 1) selected by one numeric 0-7 item, `None` if the item
/// is not numeric or out of range.
fn day_of_week_item(item: &str) -> Option<BTreeSet<u8>> {
  let (base, step) = match item.split_once('/') {
    Some((base, step)) => (base, step.parse::<u8>().ok().filter(|step| *step > 0)?),
    None => (item, 1),
  };
  let (start, end) = match base.split_once('-') {
    Some((start, end)) => (start.parse::<u8>().ok()?, end.parse::<u8>().ok()?),
    None if base == "*" => (0, 6),
    None => {
      let day = base.parse::<u8>().ok()?;
      (day, if item.contains('/') { 6 } else { day })
    }
  };
  if start > end || end > 7 {
    return None;
  }
  Some(
    (start..=end)
      .step_by(usize::from(step))
      .map(|day| day % 7 + 1)
      .collect(),
  )
}

impl fmt::Debug for CronTrigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CronTrigger")
      .field("expression", &self.expression)
      .finish()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOnceState {
  /// No fire time handed out yet.
  Unscheduled,
  /// Fire time handed out, firing still ahead.
  Pending,
  Expired,
}

/// A trigger that fires exactly once, `delay` after the instant it is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOnceTrigger {
  delay: StdDuration,
  state: RunOnceState,
}

impl RunOnceTrigger {
  pub fn new(delay: StdDuration) -> Self {
    Self {
      delay,
      state: RunOnceState::Unscheduled,
    }
  }

  /// A trigger that fires as soon as it is scheduled.
  pub fn immediate() -> Self {
    Self::new(StdDuration::ZERO)
  }

  pub fn delay(&self) -> StdDuration {
    self.delay
  }

  /// Whether the fire time was handed out and the firing has not happened yet.
  pub fn is_pending(&self) -> bool {
    self.state == RunOnceState::Pending
  }

  pub fn is_expired(&self) -> bool {
    self.state == RunOnceState::Expired
  }

  /// Returns `since + delay` the first time it is called. The next call marks
  /// the trigger as fired and every call returns [`TriggerError::Expired`] from
  /// then on.
  pub fn next_fire_time(&mut self, since: DateTime<Utc>) -> Result<DateTime<Utc>, TriggerError> {
    if self.state != RunOnceState::Unscheduled {
      self.state = RunOnceState::Expired;
      return Err(TriggerError::Expired);
    }
    let delay =
      ChronoDuration::from_std(self.delay).map_err(|_| TriggerError::InvalidDelay(self.delay))?;
    let fire_at = since
      .checked_add_signed(delay)
      .ok_or(TriggerError::InvalidDelay(self.delay))?;
    self.state = RunOnceState::Pending;
    Ok(fire_at)
  }
}

/// The trigger associated with a job at registration time.
#[derive(Debug, Clone)]
pub enum Trigger {
  Cron(CronTrigger),
  RunOnce(RunOnceTrigger),
}

impl Trigger {
  /// Parses a cron expression into a [`Trigger::Cron`].
  pub fn cron(expression: &str) -> Result<Self, TriggerError> {
    CronTrigger::parse(expression).map(Trigger::Cron)
  }

  /// A [`Trigger::RunOnce`] firing immediately.
  pub fn run_once() -> Self {
    Trigger::RunOnce(RunOnceTrigger::immediate())
  }

  /// A [`Trigger::RunOnce`] firing after `delay`.
  pub fn run_once_after(delay: StdDuration) -> Self {
    Trigger::RunOnce(RunOnceTrigger::new(delay))
  }

  /// Computes the next fire time relative to `since`.
  ///
  /// For run-once triggers this consumes the single firing.
  pub fn next_fire_time(&mut self, since: DateTime<Utc>) -> Result<DateTime<Utc>, TriggerError> {
    match self {
      Trigger::Cron(cron) => cron.next_fire_time(since),
      Trigger::RunOnce(once) => once.next_fire_time(since),
    }
  }

  /// Human-readable label used in diagnostics.
  pub fn description(&self) -> String {
    match self {
      Trigger::Cron(cron) => format!("CronTrigger::{}", cron.expression()),
      Trigger::RunOnce(once) => format!(
        "RunOnceTrigger::{}ms::{}",
        once.delay().as_millis(),
        match once.state {
          RunOnceState::Unscheduled => "valid",
          RunOnceState::Pending => "pending",
          RunOnceState::Expired => "expired",
        }
      ),
    }
  }
}

impl From<CronTrigger> for Trigger {
  fn from(cron: CronTrigger) -> Self {
    Trigger::Cron(cron)
  }
}

impl From<RunOnceTrigger> for Trigger {
  fn from(once: RunOnceTrigger) -> Self {
    Trigger::RunOnce(once)
  }
}
