//! Substrate backups: create, verify, prune, restore.
//!
//! Archives are `tar -czf` snapshots of the substrate directory taken with
//! `-C` so they hold relative paths and can be restored anywhere. Names
//! embed an ISO-8601 timestamp, so lexicographic order is age order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::task::{IntervalGate, ScheduleStatus, ScheduledTask};
use crate::config::BackupConfig;
use crate::env::{Clock, FileSystem, ProcessRunner};
use crate::error::Result;

pub const BACKUP_PREFIX: &str = "substrate-backup-";
pub const BACKUP_SUFFIX: &str = ".tar.gz";

pub fn backup_file_name(now: DateTime<Utc>) -> String {
    let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true).replace(':', "-");
    format!("{}{}{}", BACKUP_PREFIX, stamp, BACKUP_SUFFIX)
}

fn is_backup_name(name: &str) -> bool {
    name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX)
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupVerification {
    pub valid: bool,
    pub checksum: Option<String>,
    pub size_bytes: u64,
    pub files: Vec<String>,
    pub error: Option<String>,
}

impl BackupVerification {
    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackupResult {
    pub success: bool,
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
    pub verification: Option<BackupVerification>,
}

impl BackupResult {
    fn failed(backup_path: Option<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            backup_path,
            error: Some(error.into()),
            verification: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestoreResult {
    pub success: bool,
    pub restored_from: Option<PathBuf>,
    pub error: Option<String>,
}

/// Archive `substrate` into `out_dir`.
pub async fn create_backup(
    fs: &dyn FileSystem,
    runner: &dyn ProcessRunner,
    now: DateTime<Utc>,
    substrate: &Path,
    out_dir: &Path,
) -> BackupResult {
    if !fs.exists(substrate).await {
        return BackupResult::failed(None, "Substrate directory not found");
    }
    if let Err(e) = fs.create_dir_all(out_dir).await {
        return BackupResult::failed(None, format!("cannot create {}: {}", out_dir.display(), e));
    }

    let output = out_dir.join(backup_file_name(now));
    let args = vec![
        "-czf".to_string(),
        arg(&output),
        "-C".to_string(),
        arg(substrate),
        ".".to_string(),
    ];
    match runner.run("tar", &args).await {
        Ok(out) if out.success() => BackupResult {
            success: true,
            backup_path: Some(output),
            error: None,
            verification: None,
        },
        Ok(out) => BackupResult::failed(Some(output), out.stderr),
        Err(e) => BackupResult::failed(Some(output), e.to_string()),
    }
}

/// Check an archive exists, is non-empty and lists cleanly; record its SHA-256.
pub async fn verify_backup(fs: &dyn FileSystem, runner: &dyn ProcessRunner, path: &Path) -> BackupVerification {
    if !fs.exists(path).await {
        return BackupVerification::invalid(format!("Backup file not found: {}", path.display()));
    }
    let bytes = match fs.read(path).await {
        Ok(bytes) => bytes,
        Err(e) => return BackupVerification::invalid(format!("cannot read {}: {}", path.display(), e)),
    };
    if bytes.is_empty() {
        return BackupVerification::invalid("Backup file is empty");
    }
    let checksum = hex::encode(Sha256::digest(&bytes));

    let listing = match runner.run("tar", &["-tzf".to_string(), arg(path)]).await {
        Ok(out) if out.success() => out.stdout,
        Ok(out) => return BackupVerification::invalid(format!("tar verification failed: {}", out.stderr.trim())),
        Err(e) => return BackupVerification::invalid(format!("tar verification failed: {}", e)),
    };

    BackupVerification {
        valid: true,
        checksum: Some(checksum),
        size_bytes: bytes.len() as u64,
        files: listing
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        error: None,
    }
}

async fn list_backups(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<String>> {
    if !fs.exists(dir).await {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = fs.read_dir(dir).await?.into_iter().filter(|n| is_backup_name(n)).collect();
    names.sort();
    Ok(names)
}

/// Newest archive in `dir`, if any.
pub async fn find_latest_backup(fs: &dyn FileSystem, dir: &Path) -> Result<Option<PathBuf>> {
    Ok(list_backups(fs, dir).await?.pop().map(|name| dir.join(name)))
}

/// Extract `archive` (or the newest in `backup_dir`) into `substrate`.
pub async fn restore_backup(
    fs: &dyn FileSystem,
    runner: &dyn ProcessRunner,
    substrate: &Path,
    archive: Option<&Path>,
    backup_dir: Option<&Path>,
) -> RestoreResult {
    let archive = match (archive, backup_dir) {
        (Some(path), _) => Some(path.to_path_buf()),
        (None, Some(dir)) => find_latest_backup(fs, dir).await.unwrap_or_else(|e| {
            log::warn!("backup: cannot list {}: {}", dir.display(), e);
            None
        }),
        (None, None) => None,
    };
    let Some(archive) = archive else {
        return RestoreResult {
            success: false,
            restored_from: None,
            error: Some("No backup file specified and no backups found".to_string()),
        };
    };
    let failed = |error: String| RestoreResult {
        success: false,
        restored_from: Some(archive.clone()),
        error: Some(error),
    };

    if !fs.exists(&archive).await {
        return failed(format!("Backup file not found: {}", archive.display()));
    }
    if let Err(e) = fs.create_dir_all(substrate).await {
        return failed(e.to_string());
    }

    let args = vec!["-xzf".to_string(), arg(&archive), "-C".to_string(), arg(substrate)];
    match runner.run("tar", &args).await {
        Ok(out) if out.success() => RestoreResult {
            success: true,
            restored_from: Some(archive.clone()),
            error: None,
        },
        Ok(out) => failed(out.stderr),
        Err(e) => failed(e.to_string()),
    }
}

/// Interval-gated backup with optional verification and retention pruning.
pub struct BackupScheduler {
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn ProcessRunner>,
    clock: Arc<dyn Clock>,
    substrate: PathBuf,
    backup_dir: PathBuf,
    config: BackupConfig,
    gate: IntervalGate,
}

impl BackupScheduler {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        runner: Arc<dyn ProcessRunner>,
        clock: Arc<dyn Clock>,
        substrate: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        config: BackupConfig,
    ) -> Self {
        let gate = IntervalGate::new(std::time::Duration::from_millis(config.interval_ms));
        Self {
            fs,
            runner,
            clock,
            substrate: substrate.into(),
            backup_dir: backup_dir.into(),
            config,
            gate,
        }
    }

    /// Create, optionally verify, then prune. Failed attempts still advance the schedule.
    pub async fn run_backup(&mut self) -> BackupResult {
        let now = self.clock.now();
        log::info!("backup: creating archive of {}", self.substrate.display());
        let mut result = create_backup(&*self.fs, &*self.runner, now, &self.substrate, &self.backup_dir).await;
        self.gate.mark_run(now);

        if result.success && self.config.verify {
            if let Some(path) = result.backup_path.clone() {
                let verification = self.verify_backup(&path).await;
                if !verification.valid {
                    result.success = false;
                    result.error = verification.error.clone();
                }
                result.verification = Some(verification);
            }
        }

        if result.success {
            let removed = self.prune().await;
            log::info!(
                "backup: created {} (pruned {})",
                result.backup_path.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
                removed
            );
        } else {
            log::warn!("backup: failed: {}", result.error.as_deref().unwrap_or("unknown error"));
        }
        result
    }

    pub async fn verify_backup(&self, path: &Path) -> BackupVerification {
        verify_backup(&*self.fs, &*self.runner, path).await
    }

    /// Remove the oldest archives beyond the retention count. Returns how many went.
    pub async fn prune(&self) -> usize {
        let names = match list_backups(&*self.fs, &self.backup_dir).await {
            Ok(names) => names,
            Err(e) => {
                log::warn!("backup: cannot list {}: {}", self.backup_dir.display(), e);
                return 0;
            }
        };
        let excess = names.len().saturating_sub(self.config.retention_count);
        let mut removed = 0;
        for name in names.iter().take(excess) {
            let path = self.backup_dir.join(name);
            match self.fs.remove_file(&path).await {
                Ok(()) => {
                    log::debug!("backup: pruned {}", path.display());
                    removed += 1;
                }
                Err(e) => log::warn!("backup: cannot remove {}: {}", path.display(), e),
            }
        }
        removed
    }
}

#[async_trait]
impl ScheduledTask for BackupScheduler {
    fn name(&self) -> &str {
        "backup"
    }

    async fn should_run(&self) -> bool {
        self.gate.is_due(self.clock.now())
    }

    async fn run(&mut self) -> Result<()> {
        self.run_backup().await;
        Ok(())
    }

    fn status(&self) -> ScheduleStatus {
        self.gate.status(self.name(), self.clock.now())
    }
}
