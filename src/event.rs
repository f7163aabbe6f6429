//! Event records and the polymorphic trigger model.
//!
//! A record is owned by the wheel's handle table; bucket queues hold
//! only handles. The two scheduling kinds are a tagged variant with a
//! single "compute next trigger" entry point, so the wheel core never
//! inspects the kind.

use std::str::FromStr;

use chrono::{TimeZone, Utc};

use crate::handle::TimerHandle;

/// Fire callback. Receives the handle of the timer that fired and may
/// re-enter the wheel (`add*`, `stop`) it was scheduled on.
pub type FireFn = Box<dyn FnMut(TimerHandle) + Send + 'static>;

/// Stopped callback, invoked exactly once when a record is finally
/// removed, whether by round exhaustion or an explicit `stop`.
pub type StopFn = Box<dyn FnOnce(TimerHandle) + Send + 'static>;

/// Round sentinel: repeat until explicitly stopped.
pub const UNBOUNDED: u64 = u64::MAX;

/// Rejected scheduling input.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid cron expression: {0}")]
    Cron(#[from] cron::error::Error),
    #[error("cron expression has no upcoming occurrence")]
    Exhausted,
}

/// Scheduling kind of a record.
pub(crate) enum Trigger {
    /// Fixed period in milliseconds. The next trigger is computed from
    /// the actual fire-time wall clock, so drift accumulates against
    /// the original schedule, not against poll latency.
    Interval { period_ms: u64 },
    /// Parsed cron expression; next-trigger computation is delegated
    /// to the cron collaborator at one-second granularity.
    Cron { schedule: cron::Schedule },
}

impl Trigger {
    pub(crate) fn parse_cron(expr: &str) -> Result<Self, ScheduleError> {
        let schedule = cron::Schedule::from_str(expr)?;
        Ok(Trigger::Cron { schedule })
    }

    /// Next trigger tick strictly derived from `now_ms`.
    ///
    /// `None` means the trigger can never fire again (a bounded cron
    /// schedule ran out of occurrences); the wheel removes the record.
    pub(crate) fn next_trigger(&self, now_ms: u64, precision_ms: u64) -> Option<u64> {
        match self {
            Trigger::Interval { period_ms } => {
                Some(now_ms.saturating_add(*period_ms) / precision_ms)
            }
            Trigger::Cron { schedule } => {
                let now = Utc.timestamp_opt((now_ms / 1000) as i64, 0).single()?;
                let next = schedule.after(&now).next()?;
                Some(next.timestamp_millis().max(0) as u64 / precision_ms)
            }
        }
    }
}

/// Scheduling state for one live timer.
pub(crate) struct EventRecord {
    /// Next trigger tick; kept equal to the tick the record is queued
    /// under (after clamping), so the due test is exact equality.
    pub next: u64,
    /// Remaining fire count; [`UNBOUNDED`] is never decremented.
    pub rounds: u64,
    /// Taken out of the record around dispatch so the wheel lock is
    /// not held across user code.
    pub fire: Option<FireFn>,
    /// Taken exactly once, on the transition into removal.
    pub stopped: Option<StopFn>,
    pub trigger: Trigger,
}

impl EventRecord {
    pub(crate) fn new(
        next: u64,
        rounds: u64,
        trigger: Trigger,
        fire: FireFn,
        stopped: Option<StopFn>,
    ) -> Self {
        Self {
            next,
            rounds,
            fire: Some(fire),
            stopped,
            trigger,
        }
    }
}
