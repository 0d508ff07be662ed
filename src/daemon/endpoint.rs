//! Inference endpoint health marker.
//!
//! An external monitor writes `<substrate>/.endpoint_state.json`; the loop
//! only reads it. Any problem reading it means UNKNOWN.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::env::FileSystem;

pub const ENDPOINT_STATE_FILE: &str = ".endpoint_state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Up,
    Down,
    Degraded,
    #[default]
    #[serde(other)]
    Unknown,
}

impl EndpointStatus {
    /// One line for the decision context telling roles what to skip.
    pub fn context_line(&self) -> &'static str {
        match self {
            EndpointStatus::Up => "Status: UP. Inference-gated tasks: GO",
            EndpointStatus::Down => "Status: DOWN. Skip ALL inference-gated tasks",
            EndpointStatus::Degraded => "Status: DEGRADED. Skip inference-gated tasks",
            EndpointStatus::Unknown => "Status: UNKNOWN. Endpoint state unavailable; treat inference-gated tasks with caution",
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndpointStatus::Up => "UP",
            EndpointStatus::Down => "DOWN",
            EndpointStatus::Degraded => "DEGRADED",
            EndpointStatus::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointState {
    #[serde(default)]
    pub status: EndpointStatus,
    #[serde(default)]
    pub last_checked: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub consecutive_down: Option<u32>,
}

impl EndpointState {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn context_line(&self) -> String {
        match &self.last_checked {
            Some(at) if self.status != EndpointStatus::Unknown => {
                format!("[ENDPOINT] {} (last checked {})", self.status.context_line(), at)
            }
            _ => format!("[ENDPOINT] {}", self.status.context_line()),
        }
    }
}

/// Read the marker under `substrate`. Never fails.
pub async fn read_endpoint_state(fs: &dyn FileSystem, substrate: &Path) -> EndpointState {
    let path = substrate.join(ENDPOINT_STATE_FILE);
    let raw = match fs.read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) => {
            log::debug!("endpoint: no state at {} ({})", path.display(), e);
            return EndpointState::unknown();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        log::debug!("endpoint: malformed state at {} ({})", path.display(), e);
        EndpointState::unknown()
    })
}
