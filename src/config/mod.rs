//! Configuration system for subloop.
//!
//! A single YAML file, found via a fallback chain:
//! 1. Explicit path (`--config`)
//! 2. `.subloop.yml` in the current directory
//! 3. `~/.config/subloop/subloop.yml`
//! 4. Built-in defaults
//!
//! Every section is optional; missing keys take their defaults.

use eyre::Result;
use std::path::PathBuf;

pub use self::global::{
    BackupConfig, GlobalConfig, HealthConfig, InsConfig, LoopConfig, PathsConfig, WatchdogConfig,
};

mod global;

/// Project-local config file name.
pub const PROJECT_CONFIG_FILE: &str = ".subloop.yml";

/// Load configuration from the standard search paths and validate it.
pub fn load_config(explicit_path: Option<&PathBuf>) -> Result<GlobalConfig> {
    let config = GlobalConfig::load(explicit_path)?;
    config.validate()?;
    Ok(config)
}
