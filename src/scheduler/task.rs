//! Scheduled task contract.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A periodic task. The coordinator asks whether it is due, then runs it.
///
/// `run` should contain its own failures: an `Err` stops the coordinator's
/// remaining tasks for that tick.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    fn name(&self) -> &str;

    async fn should_run(&self) -> bool;

    async fn run(&mut self) -> Result<()>;

    fn status(&self) -> ScheduleStatus;
}

/// Snapshot of a task's schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    pub name: String,
    pub last_run: Option<DateTime<Utc>>,
    pub next_due: DateTime<Utc>,
    pub run_count: u64,
}

/// Fixed-interval gate: due immediately, then every `interval` after the last run.
#[derive(Debug, Clone)]
pub struct IntervalGate {
    interval: Duration,
    last_run: Option<DateTime<Utc>>,
    run_count: u64,
}

impl IntervalGate {
    pub fn new(interval: std::time::Duration) -> Self {
        Self {
            interval: Duration::from_std(interval).unwrap_or(Duration::MAX),
            last_run: None,
            run_count: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now - last >= self.interval,
        }
    }

    pub fn mark_run(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
        self.run_count += 1;
    }

    pub fn status(&self, name: &str, now: DateTime<Utc>) -> ScheduleStatus {
        ScheduleStatus {
            name: name.to_string(),
            last_run: self.last_run,
            next_due: self
                .last_run
                .and_then(|last| last.checked_add_signed(self.interval))
                .unwrap_or(now),
            run_count: self.run_count,
        }
    }
}
