//! Health check and its scheduler.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use super::task::{IntervalGate, ScheduleStatus, ScheduledTask};
use crate::env::{Clock, FileSystem};
use crate::error::Result;
use crate::substrate::SubstrateFile;

/// Single analyzer verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerFinding {
    pub healthy: bool,
    pub detail: String,
}

impl AnalyzerFinding {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
        }
    }
}

/// One dimension of substrate health.
#[async_trait]
pub trait HealthAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self) -> Result<AnalyzerFinding>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// 0 issues healthy, 1-2 degraded, 3+ unhealthy.
    pub fn from_issue_count(issues: usize) -> Self {
        match issues {
            0 => HealthStatus::Healthy,
            1 | 2 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFinding {
    pub analyzer: String,
    pub healthy: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub overall: HealthStatus,
    pub findings: Vec<NamedFinding>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn issues(&self) -> usize {
        self.findings.iter().filter(|f| !f.healthy).count()
    }
}

/// Runs every analyzer concurrently and folds them into one verdict.
#[derive(Default)]
pub struct HealthCheck {
    analyzers: Vec<Arc<dyn HealthAnalyzer>>,
}

impl HealthCheck {
    pub fn new(analyzers: Vec<Arc<dyn HealthAnalyzer>>) -> Self {
        Self { analyzers }
    }

    /// The built-in analyzers over a substrate directory.
    pub fn for_substrate(fs: Arc<dyn FileSystem>, substrate: impl Into<PathBuf>) -> Self {
        let substrate = substrate.into();
        Self::new(vec![
            Arc::new(RequiredFilesAnalyzer::new(fs.clone(), substrate.clone())) as Arc<dyn HealthAnalyzer>,
            Arc::new(PlanTasksAnalyzer::new(fs, substrate)) as Arc<dyn HealthAnalyzer>,
        ])
    }

    pub async fn run(&self, now: DateTime<Utc>) -> HealthCheckResult {
        let results = join_all(self.analyzers.iter().map(|a| a.analyze())).await;

        let findings: Vec<NamedFinding> = self
            .analyzers
            .iter()
            .zip(results)
            .map(|(analyzer, result)| {
                let finding = result.unwrap_or_else(|e| AnalyzerFinding::unhealthy(format!("analyzer failed: {}", e)));
                NamedFinding {
                    analyzer: analyzer.name().to_string(),
                    healthy: finding.healthy,
                    detail: finding.detail,
                }
            })
            .collect();

        let issues = findings.iter().filter(|f| !f.healthy).count();
        HealthCheckResult {
            overall: HealthStatus::from_issue_count(issues),
            findings,
            checked_at: now,
        }
    }
}

/// Core substrate files must exist.
pub struct RequiredFilesAnalyzer {
    fs: Arc<dyn FileSystem>,
    substrate: PathBuf,
}

impl RequiredFilesAnalyzer {
    pub const REQUIRED: [SubstrateFile; 4] = [
        SubstrateFile::Plan,
        SubstrateFile::Memory,
        SubstrateFile::Values,
        SubstrateFile::Id,
    ];

    pub fn new(fs: Arc<dyn FileSystem>, substrate: PathBuf) -> Self {
        Self { fs, substrate }
    }
}

#[async_trait]
impl HealthAnalyzer for RequiredFilesAnalyzer {
    fn name(&self) -> &str {
        "required-files"
    }

    async fn analyze(&self) -> Result<AnalyzerFinding> {
        let mut missing = Vec::new();
        for file in Self::REQUIRED {
            if !self.fs.exists(&file.path_in(&self.substrate)).await {
                missing.push(file.file_name());
            }
        }
        if missing.is_empty() {
            Ok(AnalyzerFinding::healthy("all core files present"))
        } else {
            Ok(AnalyzerFinding::unhealthy(format!("missing: {}", missing.join(", "))))
        }
    }
}

/// PLAN.md should list at least one open task.
pub struct PlanTasksAnalyzer {
    fs: Arc<dyn FileSystem>,
    substrate: PathBuf,
}

impl PlanTasksAnalyzer {
    pub fn new(fs: Arc<dyn FileSystem>, substrate: PathBuf) -> Self {
        Self { fs, substrate }
    }
}

#[async_trait]
impl HealthAnalyzer for PlanTasksAnalyzer {
    fn name(&self) -> &str {
        "plan-tasks"
    }

    async fn analyze(&self) -> Result<AnalyzerFinding> {
        let plan = self
            .fs
            .read_to_string(&SubstrateFile::Plan.path_in(&self.substrate))
            .await?;
        let open = plan.lines().filter(|l| l.trim_start().starts_with("- [ ]")).count();
        let done = plan
            .lines()
            .filter(|l| {
                let l = l.trim_start();
                l.starts_with("- [x]") || l.starts_with("- [X]")
            })
            .count();
        if open == 0 {
            Ok(AnalyzerFinding::unhealthy(format!("no open tasks ({} done)", done)))
        } else {
            Ok(AnalyzerFinding::healthy(format!("{} open, {} done", open, done)))
        }
    }
}

/// Runs the health check on an interval and keeps the latest result.
pub struct HealthCheckScheduler {
    check: HealthCheck,
    clock: Arc<dyn Clock>,
    gate: IntervalGate,
    last_result: Option<HealthCheckResult>,
}

impl HealthCheckScheduler {
    pub fn new(check: HealthCheck, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            check,
            clock,
            gate: IntervalGate::new(interval),
            last_result: None,
        }
    }

    pub fn last_result(&self) -> Option<&HealthCheckResult> {
        self.last_result.as_ref()
    }

    pub async fn run_check(&mut self) -> HealthCheckResult {
        let now = self.clock.now();
        log::debug!("health: running check #{}", self.status().run_count + 1);
        let result = self.check.run(now).await;
        self.gate.mark_run(now);

        match result.overall {
            HealthStatus::Healthy => log::debug!("health: {}", result.overall),
            _ => log::warn!("health: {} ({} issue(s))", result.overall, result.issues()),
        }
        self.last_result = Some(result.clone());
        result
    }
}

#[async_trait]
impl ScheduledTask for HealthCheckScheduler {
    fn name(&self) -> &str {
        "health-check"
    }

    async fn should_run(&self) -> bool {
        self.gate.is_due(self.clock.now())
    }

    async fn run(&mut self) -> Result<()> {
        self.run_check().await;
        Ok(())
    }

    fn status(&self) -> ScheduleStatus {
        self.gate.status(self.name(), self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{FixedClock, InMemoryFileSystem};
    use crate::error::LoopError;
    use chrono::TimeZone;
    use std::path::Path;

    struct Fixed(&'static str, Option<bool>);

    #[async_trait]
    impl HealthAnalyzer for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn analyze(&self) -> Result<AnalyzerFinding> {
            match self.1 {
                Some(true) => Ok(AnalyzerFinding::healthy("ok")),
                Some(false) => Ok(AnalyzerFinding::unhealthy("bad")),
                None => Err(LoopError::Storage("unreadable".into())),
            }
        }
    }

    fn check(verdicts: &[Option<bool>]) -> HealthCheck {
        const NAMES: [&str; 5] = ["a", "b", "c", "d", "e"];
        HealthCheck::new(
            verdicts
                .iter()
                .zip(NAMES)
                .map(|(v, n)| Arc::new(Fixed(n, *v)) as Arc<dyn HealthAnalyzer>)
                .collect(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_overall_from_issue_count() {
        let all_ok = check(&[Some(true); 5]).run(now()).await;
        assert_eq!(all_ok.overall, HealthStatus::Healthy);

        let two_bad = check(&[Some(false), Some(true), Some(false), Some(true), Some(true)])
            .run(now())
            .await;
        assert_eq!(two_bad.overall, HealthStatus::Degraded);

        let three_bad = check(&[Some(false), Some(false), Some(true), Some(false), Some(true)])
            .run(now())
            .await;
        assert_eq!(three_bad.overall, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_analyzer_error_counts_as_issue() {
        let result = check(&[None, Some(true)]).run(now()).await;
        assert_eq!(result.overall, HealthStatus::Degraded);
        assert_eq!(result.findings[0].analyzer, "a");
        assert!(result.findings[0].detail.contains("unreadable"));
    }

    #[tokio::test]
    async fn test_builtin_analyzers() {
        let fs = Arc::new(InMemoryFileSystem::new());
        fs.write(Path::new("/s/PLAN.md"), "# Plan\n- [ ] ship\n- [x] design\n")
            .await
            .unwrap();

        let result = HealthCheck::for_substrate(fs.clone(), "/s").run(now()).await;
        assert_eq!(result.findings[0].detail, "missing: MEMORY.md, VALUES.md, ID.md");
        assert_eq!(result.findings[1].detail, "1 open, 1 done");
        assert_eq!(result.overall, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_scheduler_runs_first_check_immediately() {
        let clock = Arc::new(FixedClock::new(now()));
        let mut scheduler = HealthCheckScheduler::new(check(&[Some(true)]), clock.clone(), Duration::from_secs(3600));

        assert!(scheduler.should_run().await);
        assert!(scheduler.last_result().is_none());
        scheduler.run().await.unwrap();

        assert!(!scheduler.should_run().await);
        assert_eq!(scheduler.last_result().unwrap().overall, HealthStatus::Healthy);

        clock.advance(chrono::Duration::hours(1));
        assert!(scheduler.should_run().await);

        let status = scheduler.status();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.last_run, Some(now()));
        assert_eq!(status.next_due, now() + chrono::Duration::hours(1));
    }
}
