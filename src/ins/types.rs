//! Rule engine result types.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsActionKind {
    Compaction,
    ArchiveTag,
    ComplianceFlag,
}

impl fmt::Display for InsActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InsActionKind::Compaction => "compaction",
            InsActionKind::ArchiveTag => "archive_tag",
            InsActionKind::ComplianceFlag => "compliance_flag",
        };
        write!(f, "{}", s)
    }
}

/// One finding, advisory only. The engine never acts on it itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsAction {
    pub kind: InsActionKind,
    pub target: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flagged_pattern: Option<String>,
}

impl InsAction {
    pub fn new(kind: InsActionKind, target: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            detail: detail.into(),
            flagged_pattern: None,
        }
    }
}

impl fmt::Display for InsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[INS {}] {}: {}", self.kind, self.target, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InsResult {
    pub noop: bool,
    pub actions: Vec<InsAction>,
}

impl InsResult {
    pub fn noop() -> Self {
        Self {
            noop: true,
            actions: Vec::new(),
        }
    }

    pub fn from_actions(actions: Vec<InsAction>) -> Self {
        Self {
            noop: actions.is_empty(),
            actions,
        }
    }
}

/// Outcome class of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    Success,
    Partial,
    Failure,
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskResult::Success => "success",
            TaskResult::Partial => "partial",
            TaskResult::Failure => "failure",
        };
        write!(f, "{}", s)
    }
}

/// What the rule engine needs to know about the previous cycle's task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTaskResult {
    pub result: TaskResult,
    pub summary: Option<String>,
}

impl LastTaskResult {
    pub fn new(result: TaskResult, summary: impl Into<String>) -> Self {
        Self {
            result,
            summary: Some(summary.into()),
        }
    }
}
