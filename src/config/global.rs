//! Global configuration.
//!
//! Loaded from ~/.config/subloop/subloop.yml or .subloop.yml

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global configuration for subloop.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Directory layout.
    pub paths: PathsConfig,

    /// Cycle loop tuning.
    #[serde(rename = "loop")]
    pub loop_: LoopConfig,

    /// Pre-cycle rule thresholds.
    pub ins: InsConfig,

    /// Stall detection.
    pub watchdog: WatchdogConfig,

    /// Periodic health check.
    pub health: HealthConfig,

    /// Periodic substrate backup.
    pub backup: BackupConfig,
}

impl GlobalConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .subloop.yml in current directory
    /// 3. ~/.config/subloop/subloop.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(crate::config::PROJECT_CONFIG_FILE);
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from {}", project_config.display());
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load {}: {}", project_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("subloop").join("subloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.loop_.max_concurrent_sessions == 0 {
            eyre::bail!("loop.max-concurrent-sessions must be > 0");
        }
        if self.loop_.superego_audit_interval == 0 {
            eyre::bail!("loop.superego-audit-interval must be > 0");
        }
        if self.loop_.max_consecutive_idle_cycles == 0 {
            eyre::bail!("loop.max-consecutive-idle-cycles must be > 0");
        }
        if self.loop_.successful_cycle_caution > self.loop_.successful_cycle_ceiling {
            eyre::bail!("loop.successful-cycle-caution must not exceed loop.successful-cycle-ceiling");
        }
        if self.ins.conversation_line_threshold == 0
            || self.ins.progress_line_threshold == 0
            || self.ins.memory_char_threshold == 0
        {
            eyre::bail!("ins size thresholds must be > 0");
        }
        if self.ins.consecutive_partial_threshold == 0 {
            eyre::bail!("ins.consecutive-partial-threshold must be > 0");
        }
        if self.watchdog.stall_threshold_ms == 0 || self.watchdog.check_interval_ms == 0 {
            eyre::bail!("watchdog thresholds must be > 0");
        }
        if self.health.interval_ms == 0 || self.backup.interval_ms == 0 {
            eyre::bail!("scheduler intervals must be > 0");
        }
        if self.backup.retention_count == 0 {
            eyre::bail!("backup.retention-count must be > 0");
        }
        Ok(())
    }
}

/// Directory layout.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Substrate directory (PLAN.md, MEMORY.md, ...).
    pub substrate: PathBuf,

    /// Private loop state (compliance counters).
    pub state: PathBuf,

    /// Backup archive directory.
    pub backups: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            substrate: PathBuf::from("./substrate"),
            state: PathBuf::from("./.subloop/state"),
            backups: PathBuf::from("./.subloop/backups"),
        }
    }
}

/// Cycle loop tuning.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Delay between cycles in milliseconds.
    #[serde(rename = "cycle-delay-ms")]
    pub cycle_delay_ms: u64,

    /// Consecutive idle cycles before the loop stops itself.
    #[serde(rename = "max-consecutive-idle-cycles")]
    pub max_consecutive_idle_cycles: u64,

    /// Run an audit every N cycles.
    #[serde(rename = "superego-audit-interval")]
    pub superego_audit_interval: u64,

    /// Successful cycles at which a caution is logged.
    #[serde(rename = "successful-cycle-caution")]
    pub successful_cycle_caution: u64,

    /// Successful cycles at which the loop halts for review.
    #[serde(rename = "successful-cycle-ceiling")]
    pub successful_cycle_ceiling: u64,

    /// Concurrent backend sessions.
    #[serde(rename = "max-concurrent-sessions")]
    pub max_concurrent_sessions: usize,
}

impl LoopConfig {
    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_delay_ms: 30_000,
            max_consecutive_idle_cycles: 10,
            superego_audit_interval: 20,
            successful_cycle_caution: 30,
            successful_cycle_ceiling: 50,
            max_concurrent_sessions: crate::sync::DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Pre-cycle rule thresholds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InsConfig {
    /// CONVERSATION.md lines before compaction is flagged.
    #[serde(rename = "conversation-line-threshold")]
    pub conversation_line_threshold: usize,

    /// PROGRESS.md lines before compaction is flagged.
    #[serde(rename = "progress-line-threshold")]
    pub progress_line_threshold: usize,

    /// MEMORY.md characters before a summary is flagged (~30K tokens).
    #[serde(rename = "memory-char-threshold")]
    pub memory_char_threshold: usize,

    /// Same-precondition partial outcomes before a compliance flag.
    #[serde(rename = "consecutive-partial-threshold")]
    pub consecutive_partial_threshold: u32,

    /// Age in days before a SUPERSEDED memory file is an archive candidate.
    #[serde(rename = "archive-age-days")]
    pub archive_age_days: i64,

    /// memory/ entries above which the archive scan is skipped.
    #[serde(rename = "archive-scan-max-files")]
    pub archive_scan_max_files: usize,

    /// Time budget for one evaluation in milliseconds.
    #[serde(rename = "budget-ms")]
    pub budget_ms: u64,
}

impl Default for InsConfig {
    fn default() -> Self {
        Self {
            conversation_line_threshold: 80,
            progress_line_threshold: 200,
            memory_char_threshold: 120_000,
            consecutive_partial_threshold: 3,
            archive_age_days: 30,
            archive_scan_max_files: 100,
            budget_ms: 500,
        }
    }
}

/// Stall detection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Inactivity before a reminder is injected.
    #[serde(rename = "stall-threshold-ms")]
    pub stall_threshold_ms: u64,

    /// How often to check for a stall.
    #[serde(rename = "check-interval-ms")]
    pub check_interval_ms: u64,

    /// Time after the reminder before a restart is requested. Absent disables it.
    #[serde(rename = "force-restart-threshold-ms", skip_serializing_if = "Option::is_none")]
    pub force_restart_threshold_ms: Option<u64>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stall_threshold_ms: 20 * 60 * 1000,
            check_interval_ms: 60_000,
            force_restart_threshold_ms: None,
        }
    }
}

/// Periodic health check.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60 * 60 * 1000,
        }
    }
}

/// Periodic substrate backup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackupConfig {
    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,

    /// Archives kept after pruning.
    #[serde(rename = "retention-count")]
    pub retention_count: usize,

    /// Checksum and list each archive after creating it.
    pub verify: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval_ms: 24 * 60 * 60 * 1000,
            retention_count: 7,
            verify: true,
        }
    }
}
