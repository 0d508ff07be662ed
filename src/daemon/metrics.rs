//! Cycle counters.

use serde::{Deserialize, Serialize};

/// Counters updated once per completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleMetrics {
    /// Every completed cycle
    pub total_cycles: u64,
    /// Dispatches whose task did not fail
    pub successful_cycles: u64,
    /// Dispatches that failed, and cycles whose decision failed
    pub failed_cycles: u64,
    /// Cycles where nothing was dispatched
    pub idle_cycles: u64,
    /// Idle cycles since the last non-idle one
    pub consecutive_idle_cycles: u64,
    /// Completed audits
    pub superego_audits: u64,
}

impl CycleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.total_cycles += 1;
        self.successful_cycles += 1;
        self.consecutive_idle_cycles = 0;
    }

    pub fn record_failure(&mut self) {
        self.total_cycles += 1;
        self.failed_cycles += 1;
        self.consecutive_idle_cycles = 0;
    }

    pub fn record_idle(&mut self) {
        self.total_cycles += 1;
        self.idle_cycles += 1;
        self.consecutive_idle_cycles += 1;
    }

    pub fn record_audit(&mut self) {
        self.superego_audits += 1;
    }
}
