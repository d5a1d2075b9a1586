//! Per-source polling gate.
//!
//! Each data source owns one [`PollingGate`]. The gate decides whether a new
//! fetch cycle may start and records the start time in the same step, so a
//! slow or failing fetch can never be overlapped by a second permit inside
//! the same interval.

use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug)]
pub struct PollingGate {
    min_interval: Duration,
    last_run_at: Mutex<Option<DateTime<Utc>>>,
}

impl PollingGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_run_at: Mutex::new(None),
        }
    }

    /// Returns `true` when no run has been recorded yet or at least
    /// `min_interval` has elapsed since the last permitted run. A `true`
    /// result records `now` as the last run before returning.
    ///
    /// The check and the update happen under one lock and never yield, so
    /// concurrent callers on the same gate observe at most one permit per
    /// window.
    pub fn should_run(&self, now: DateTime<Utc>) -> bool {
        let mut last_run_at = self
            .last_run_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(last) = *last_run_at {
            // A clock that stepped backwards gives a negative elapsed time,
            // which is denied and leaves `last_run_at` untouched.
            if now - last < self.min_interval {
                return false;
            }
        }

        *last_run_at = Some(now);
        true
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        *self
            .last_run_at
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}
