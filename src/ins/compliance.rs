//! Persisted consecutive-partial counters.
//!
//! Survives restarts as `<state_dir>/compliance.json`. Writes are lazy:
//! mutations only mark the store dirty and `save` is a no-op when clean.
//! A missing or corrupt file starts the store fresh.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::env::FileSystem;

pub const COMPLIANCE_FILE: &str = "compliance.json";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRecord {
    pub count: u32,
    pub first_cycle: u64,
    pub last_cycle: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceState {
    pub partials: BTreeMap<String, PartialRecord>,
    #[serde(default)]
    pub last_updated_cycle: u64,
}

pub struct ComplianceStore {
    fs: Arc<dyn FileSystem>,
    state_dir: PathBuf,
    state: ComplianceState,
    dirty: bool,
}

impl ComplianceStore {
    /// Load the store, returning whether it started fresh.
    pub async fn load(fs: Arc<dyn FileSystem>, state_dir: impl Into<PathBuf>) -> (Self, bool) {
        let state_dir = state_dir.into();
        let path = state_dir.join(COMPLIANCE_FILE);

        let loaded = match fs.read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<ComplianceState>(&raw) {
                Ok(state) => Some(state),
                Err(e) => {
                    log::debug!("ins: compliance state at {} is invalid ({}), starting fresh", path.display(), e);
                    None
                }
            },
            Err(_) => {
                log::debug!("ins: no compliance state at {}, starting fresh", path.display());
                None
            }
        };

        let fresh = loaded.is_none();
        let store = Self {
            fs,
            state_dir,
            state: loaded.unwrap_or_default(),
            dirty: false,
        };
        (store, fresh)
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(COMPLIANCE_FILE)
    }

    pub fn record_partial(&mut self, precondition: &str, cycle: u64) {
        self.state
            .partials
            .entry(precondition.to_string())
            .and_modify(|r| {
                r.count += 1;
                r.last_cycle = cycle;
            })
            .or_insert(PartialRecord {
                count: 1,
                first_cycle: cycle,
                last_cycle: cycle,
            });
        self.state.last_updated_cycle = cycle;
        self.dirty = true;
    }

    pub fn partial_count(&self, precondition: &str) -> u32 {
        self.state.partials.get(precondition).map_or(0, |r| r.count)
    }

    pub fn clear_partial(&mut self, precondition: &str) {
        if self.state.partials.remove(precondition).is_some() {
            self.dirty = true;
        }
    }

    /// Forget every tracked precondition. Only dirties the store if any existed.
    pub fn clear_all(&mut self) {
        if !self.state.partials.is_empty() {
            self.state.partials.clear();
            self.dirty = true;
        }
    }

    pub fn snapshot(&self) -> ComplianceState {
        self.state.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist if dirty. Failures are logged and leave the store dirty.
    pub async fn save(&mut self) {
        if !self.dirty {
            return;
        }
        let path = self.path();
        let result: crate::error::Result<()> = async {
            self.fs.create_dir_all(&self.state_dir).await?;
            let json = serde_json::to_string_pretty(&self.state)?;
            self.fs.write(&path, &json).await
        }
        .await;

        match result {
            Ok(()) => self.dirty = false,
            Err(e) => log::warn!("ins: failed to save compliance state to {}: {}", path.display(), e),
        }
    }
}
