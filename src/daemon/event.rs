//! Loop events, the orchestrator's only outward signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::metrics::CycleMetrics;
use super::orchestrator::CycleResult;
use super::state::LoopState;
use crate::ins::InsAction;
use crate::session::LogEntry;

/// Event type constants
pub mod event_types {
    pub const STATE_CHANGED: &str = "state_changed";
    pub const CYCLE_COMPLETE: &str = "cycle_complete";
    pub const IDLE: &str = "idle";
    pub const AUDIT_COMPLETE: &str = "audit_complete";
    pub const INS_ACTIONS: &str = "ins_actions";
    pub const SAFETY_CEILING: &str = "safety_ceiling";
    pub const METRICS_UPDATED: &str = "metrics_updated";
    pub const SESSION_LOG: &str = "session_log";
}

/// Immutable event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

impl LoopEvent {
    pub fn new(event_type: &str, timestamp: DateTime<Utc>, data: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            timestamp,
            data,
        }
    }

    pub fn state_changed(from: LoopState, to: LoopState, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            event_types::STATE_CHANGED,
            timestamp,
            json!({ "from": from, "to": to }),
        )
    }

    pub fn cycle_complete(result: &CycleResult, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            event_types::CYCLE_COMPLETE,
            timestamp,
            serde_json::to_value(result).unwrap_or(Value::Null),
        )
    }

    pub fn idle(cycle: u64, consecutive: u64, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            event_types::IDLE,
            timestamp,
            json!({ "cycleNumber": cycle, "consecutiveIdleCycles": consecutive }),
        )
    }

    pub fn audit_complete(cycle: u64, summary: &str, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            event_types::AUDIT_COMPLETE,
            timestamp,
            json!({ "cycleNumber": cycle, "summary": summary }),
        )
    }

    pub fn ins_actions(cycle: u64, actions: &[InsAction], timestamp: DateTime<Utc>) -> Self {
        Self::new(
            event_types::INS_ACTIONS,
            timestamp,
            json!({ "cycleNumber": cycle, "actions": actions }),
        )
    }

    pub fn safety_ceiling(successful: u64, threshold: u64, halted: bool, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            event_types::SAFETY_CEILING,
            timestamp,
            json!({ "successfulCycles": successful, "threshold": threshold, "halted": halted }),
        )
    }

    pub fn metrics_updated(metrics: &CycleMetrics, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            event_types::METRICS_UPDATED,
            timestamp,
            serde_json::to_value(metrics).unwrap_or(Value::Null),
        )
    }

    pub fn session_log(cycle: u64, entry: &LogEntry, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            event_types::SESSION_LOG,
            timestamp,
            json!({ "cycleNumber": cycle, "kind": entry.kind, "content": entry.content }),
        )
    }
}
