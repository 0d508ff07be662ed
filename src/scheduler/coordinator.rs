//! Scheduler coordinator.

use super::task::{ScheduleStatus, ScheduledTask};
use crate::error::Result;

/// Ordered list of scheduled tasks, run once per cycle.
#[derive(Default)]
pub struct SchedulerCoordinator {
    tasks: Vec<Box<dyn ScheduledTask>>,
}

impl SchedulerCoordinator {
    pub fn new(tasks: Vec<Box<dyn ScheduledTask>>) -> Self {
        Self { tasks }
    }

    pub fn push(&mut self, task: Box<dyn ScheduledTask>) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every due task in list order.
    ///
    /// The first task error is returned immediately and the tasks after it
    /// are not consulted this tick. Tasks are not isolated from each other.
    pub async fn run_due(&mut self) -> Result<()> {
        for task in self.tasks.iter_mut() {
            if task.should_run().await {
                log::debug!("scheduler: running {}", task.name());
                task.run().await?;
            }
        }
        Ok(())
    }

    pub fn statuses(&self) -> Vec<ScheduleStatus> {
        self.tasks.iter().map(|t| t.status()).collect()
    }
}
