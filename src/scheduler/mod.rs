//! Periodic maintenance tasks run between cycles.
//!
//! This module provides:
//! - **ScheduledTask**: the "is it due / run it" contract
//! - **SchedulerCoordinator**: runs the due tasks of an ordered list
//! - **HealthCheckScheduler**: interval-gated multi-analyzer health check
//! - **BackupScheduler**: interval-gated substrate archive with verification
//!   and retention
//!
//! # Example
//!
//! ```ignore
//! let mut coordinator = SchedulerCoordinator::new(vec![
//!     Box::new(HealthCheckScheduler::new(check, clock.clone(), Duration::from_secs(3600))),
//!     Box::new(BackupScheduler::new(fs, runner, clock, &substrate, &backups, BackupConfig::default())),
//! ]);
//! coordinator.run_due().await?;
//! ```

mod backup;
mod coordinator;
mod health;
mod task;

pub use backup::{
    BACKUP_PREFIX, BACKUP_SUFFIX, BackupResult, BackupScheduler, BackupVerification, RestoreResult, backup_file_name,
    create_backup, find_latest_backup, restore_backup, verify_backup,
};
pub use coordinator::SchedulerCoordinator;
pub use health::{
    AnalyzerFinding, HealthAnalyzer, HealthCheck, HealthCheckResult, HealthCheckScheduler, HealthStatus,
    NamedFinding, PlanTasksAnalyzer, RequiredFilesAnalyzer,
};
pub use task::{IntervalGate, ScheduleStatus, ScheduledTask};
