//! Decision-role collaborators.
//!
//! The orchestrator depends only on the shape of what each role returns:
//! - **Ego**: decides between dispatching a task and idling
//! - **Subconscious**: prepares the backend session and interprets its result
//! - **Superego**: periodic audits and evaluation of follow-up proposals
//! - **Id**: generates drives when there is nothing to do

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::endpoint::EndpointState;
use super::metrics::CycleMetrics;
use crate::error::Result;
use crate::ins::{InsAction, TaskResult};
use crate::session::{SessionConfig, SessionResult};
use crate::substrate::SubstrateMutation;

/// Everything a role sees at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleContext {
    pub cycle: u64,
    pub endpoint: EndpointState,
    pub ins_actions: Vec<InsAction>,
    pub pending_messages: Vec<String>,
    pub metrics: CycleMetrics,
}

impl CycleContext {
    /// Plain-text rendering handed to prompt-driven roles.
    pub fn briefing(&self) -> String {
        let mut out = format!("Cycle {}\n{}\n", self.cycle, self.endpoint.context_line());
        if !self.ins_actions.is_empty() {
            out.push_str("\nRule notices:\n");
            for action in &self.ins_actions {
                let _ = writeln!(out, "- {}", action);
            }
        }
        if !self.pending_messages.is_empty() {
            out.push_str("\nMessages:\n");
            for message in &self.pending_messages {
                let _ = writeln!(out, "- {}", message);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDispatch {
    pub task_id: String,
    pub description: String,
}

impl TaskDispatch {
    pub fn new(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EgoDecision {
    Dispatch(TaskDispatch),
    Idle,
}

/// Interpreted result of one dispatched task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub result: TaskResult,
    pub summary: String,
    pub mutations: Vec<SubstrateMutation>,
    /// Follow-up ideas for the Superego; evaluated off the critical path.
    pub proposals: Vec<String>,
}

impl TaskOutcome {
    pub fn new(result: TaskResult, summary: impl Into<String>) -> Self {
        Self {
            result,
            summary: summary.into(),
            mutations: Vec::new(),
            proposals: Vec::new(),
        }
    }

    pub fn with_mutation(mut self, mutation: SubstrateMutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn with_proposal(mut self, proposal: impl Into<String>) -> Self {
        self.proposals.push(proposal.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuditReport {
    pub summary: String,
    pub findings: Vec<String>,
}

#[async_trait]
pub trait Ego: Send + Sync {
    async fn decide(&self, context: &CycleContext) -> Result<EgoDecision>;
}

#[async_trait]
pub trait Subconscious: Send + Sync {
    async fn prepare_session(&self, task: &TaskDispatch, context: &CycleContext) -> Result<SessionConfig>;

    async fn interpret(&self, task: &TaskDispatch, session: &SessionResult) -> Result<TaskOutcome>;
}

#[async_trait]
pub trait Superego: Send + Sync {
    async fn audit(&self, cycle: u64) -> Result<AuditReport>;

    async fn evaluate_proposals(&self, proposals: Vec<String>) -> Result<()>;
}

#[async_trait]
pub trait Id: Send + Sync {
    async fn generate_drives(&self, context: &CycleContext) -> Result<Vec<String>>;
}

/// The four collaborators as one bundle.
#[derive(Clone)]
pub struct Roles {
    pub ego: Arc<dyn Ego>,
    pub subconscious: Arc<dyn Subconscious>,
    pub superego: Arc<dyn Superego>,
    pub id: Arc<dyn Id>,
}
