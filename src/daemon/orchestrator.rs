//! Loop Orchestrator - the cycle driver
//!
//! Each cycle:
//! - applies the safety ceiling on successful cycles
//! - runs the pre-cycle rules and reads the endpoint marker
//! - asks the Ego to dispatch or idle
//! - dispatches through the admission gate and writes mutations under
//!   per-file locks, or collects Id drives when idle
//! - runs the periodic audit, watchdog bookkeeping and due schedulers
//! - emits `metrics_updated` and `cycle_complete`

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::endpoint::read_endpoint_state;
use super::event::LoopEvent;
use super::handle::{LoopCommand, LoopHandle};
use super::metrics::CycleMetrics;
use super::roles::{CycleContext, EgoDecision, Roles, TaskDispatch, TaskOutcome};
use super::sink::EventSink;
use super::state::LoopState;
use crate::config::{LoopConfig, WatchdogConfig};
use crate::env::{Clock, FileSystem, Timer};
use crate::error::{LoopError, Result};
use crate::ins::{InsHook, LastTaskResult, TaskResult};
use crate::scheduler::{ScheduleStatus, SchedulerCoordinator};
use crate::session::SessionManager;
use crate::substrate::{SubstrateFile, SubstrateWriter};
use crate::sync::{AdmissionGate, DeferredWork, ResourceLock};
use crate::watchdog::{RestartFn, Watchdog};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleAction {
    Dispatch,
    Idle,
}

/// What one cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleResult {
    pub cycle_number: u64,
    pub action: CycleAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub success: bool,
    pub summary: String,
    pub duration_ms: u64,
}

impl CycleResult {
    fn idle(cycle_number: u64, success: bool, summary: impl Into<String>) -> Self {
        Self {
            cycle_number,
            action: CycleAction::Idle,
            task_id: None,
            success,
            summary: summary.into(),
            duration_ms: 0,
        }
    }
}

/// Collaborators the orchestrator cannot run without.
#[derive(Clone)]
pub struct LoopDeps {
    pub clock: Arc<dyn Clock>,
    pub timer: Arc<dyn Timer>,
    pub sink: Arc<dyn EventSink>,
    pub fs: Arc<dyn FileSystem>,
    pub sessions: Arc<SessionManager>,
    pub writer: Arc<dyn SubstrateWriter>,
    pub roles: Roles,
}

pub struct LoopOrchestrator {
    config: LoopConfig,
    substrate: PathBuf,
    deps: LoopDeps,
    state: LoopState,
    metrics: CycleMetrics,
    cycle: u64,
    ins: Option<InsHook>,
    watchdog: Option<(Arc<Watchdog>, std::time::Duration)>,
    schedulers: SchedulerCoordinator,
    gate: Arc<AdmissionGate>,
    locks: ResourceLock<SubstrateFile>,
    deferred: DeferredWork,
    last_task: Option<LastTaskResult>,
    pending_messages: Vec<String>,
    commands_tx: mpsc::UnboundedSender<LoopCommand>,
    commands_rx: mpsc::UnboundedReceiver<LoopCommand>,
}

impl LoopOrchestrator {
    pub fn new(config: LoopConfig, substrate: impl Into<PathBuf>, deps: LoopDeps) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(AdmissionGate::new(config.max_concurrent_sessions));
        let deferred = DeferredWork::with_error_handler(Arc::new(|e: &LoopError| {
            log::warn!("orchestrator: deferred follow-up failed: {}", e);
        }));
        Self {
            config,
            substrate: substrate.into(),
            deps,
            state: LoopState::Stopped,
            metrics: CycleMetrics::new(),
            cycle: 0,
            ins: None,
            watchdog: None,
            schedulers: SchedulerCoordinator::default(),
            gate,
            locks: ResourceLock::new(),
            deferred,
            last_task: None,
            pending_messages: Vec::new(),
            commands_tx,
            commands_rx,
        }
    }

    pub fn with_ins(mut self, ins: InsHook) -> Self {
        self.ins = Some(ins);
        self
    }

    /// Attach a watchdog; it is started with `check_interval` on `start()`.
    pub fn with_watchdog(mut self, watchdog: Arc<Watchdog>, check_interval: std::time::Duration) -> Self {
        self.watchdog = Some((watchdog, check_interval));
        self
    }

    /// Attach a watchdog that reminds the running session and, if a force
    /// restart threshold is set, restarts it by closing it.
    pub fn with_session_watchdog(self, config: &WatchdogConfig) -> Self {
        let sessions = self.deps.sessions.clone();
        let restart: RestartFn = Arc::new(move || sessions.stop());
        let watchdog = Watchdog::for_sessions(config, self.deps.clock.clone(), self.deps.sessions.clone(), Some(restart));
        let interval = std::time::Duration::from_millis(config.check_interval_ms);
        self.with_watchdog(Arc::new(watchdog), interval)
    }

    pub fn with_schedulers(mut self, schedulers: SchedulerCoordinator) -> Self {
        self.schedulers = schedulers;
        self
    }

    /// Seed metrics, e.g. when resuming a long-running substrate.
    pub fn with_metrics(mut self, metrics: CycleMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Share an admission gate with other session users.
    pub fn with_gate(mut self, gate: Arc<AdmissionGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle::new(
            self.commands_tx.clone(),
            self.deps.timer.clone(),
            self.deps.sessions.clone(),
        )
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn metrics(&self) -> &CycleMetrics {
        &self.metrics
    }

    pub fn cycle_number(&self) -> u64 {
        self.cycle
    }

    pub fn pending_messages(&self) -> &[String] {
        &self.pending_messages
    }

    pub fn schedule_statuses(&self) -> Vec<ScheduleStatus> {
        self.schedulers.statuses()
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn start(&mut self) -> bool {
        if !self.transition(LoopState::Running) {
            return false;
        }
        if let Some((watchdog, interval)) = &self.watchdog {
            watchdog.record_activity();
            watchdog.start(*interval);
        }
        true
    }

    pub fn pause(&mut self) -> bool {
        self.transition(LoopState::Paused)
    }

    pub fn resume(&mut self) -> bool {
        let resumed = self.transition(LoopState::Running);
        if resumed {
            self.deps.timer.wake();
        }
        resumed
    }

    pub fn stop(&mut self) -> bool {
        if !self.transition(LoopState::Stopped) {
            return false;
        }
        if let Some((watchdog, _)) = &self.watchdog {
            watchdog.stop();
        }
        self.deps.timer.wake();
        true
    }

    fn transition(&mut self, to: LoopState) -> bool {
        let from = self.state;
        if !from.can_transition_to(to) {
            log::debug!("orchestrator: ignoring {} -> {}", from, to);
            return false;
        }
        self.state = to;
        log::info!("orchestrator: {} -> {}", from, to);
        self.deps
            .sink
            .emit(LoopEvent::state_changed(from, to, self.deps.clock.now()));
        true
    }

    fn apply_command(&mut self, command: LoopCommand) {
        match command {
            LoopCommand::Pause => {
                self.pause();
            }
            LoopCommand::Resume => {
                self.resume();
            }
            LoopCommand::Stop => {
                self.stop();
            }
            LoopCommand::Message(message) => self.pending_messages.push(message),
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            self.apply_command(command);
        }
    }

    /// Drive cycles until the loop is stopped. Requires `start()` first.
    pub async fn run_loop(&mut self) -> Result<()> {
        if self.state == LoopState::Stopped {
            return Err(LoopError::InvalidState("run_loop called before start".into()));
        }

        loop {
            self.drain_commands();
            match self.state {
                LoopState::Stopped => break,
                LoopState::Paused => {
                    if let Some(command) = self.commands_rx.recv().await {
                        self.apply_command(command);
                    }
                    continue;
                }
                LoopState::Running => {}
            }

            self.execute_one_cycle().await;

            if self.state == LoopState::Running
                && self.metrics.consecutive_idle_cycles >= self.config.max_consecutive_idle_cycles
            {
                log::info!(
                    "orchestrator: {} consecutive idle cycles, stopping",
                    self.metrics.consecutive_idle_cycles
                );
                self.stop();
            }

            self.drain_commands();
            if self.state == LoopState::Running {
                self.deps.timer.delay(self.config.cycle_delay()).await;
            }
        }

        self.deferred.drain().await;
        Ok(())
    }

    /// Run exactly one cycle. Never fails; role and session errors become a
    /// failed cycle.
    pub async fn execute_one_cycle(&mut self) -> CycleResult {
        self.cycle += 1;
        let cycle = self.cycle;
        let started = self.deps.clock.now();

        let successful = self.metrics.successful_cycles;
        if successful >= self.config.successful_cycle_ceiling {
            log::warn!(
                "[ceiling] {} successful cycles reached ceiling {}; halting for human review",
                successful,
                self.config.successful_cycle_ceiling
            );
            self.deps.sink.emit(LoopEvent::safety_ceiling(
                successful,
                self.config.successful_cycle_ceiling,
                true,
                started,
            ));
            self.stop();
            let result = CycleResult::idle(cycle, true, "safety ceiling reached");
            self.deps
                .sink
                .emit(LoopEvent::cycle_complete(&result, self.deps.clock.now()));
            return result;
        }
        if successful >= self.config.successful_cycle_caution {
            log::warn!(
                "[ceiling] {} successful cycles, caution threshold {}",
                successful,
                self.config.successful_cycle_caution
            );
            self.deps.sink.emit(LoopEvent::safety_ceiling(
                successful,
                self.config.successful_cycle_ceiling,
                false,
                started,
            ));
        }

        let last = self.last_task.take();
        let ins_actions = match self.ins.as_mut() {
            Some(hook) => {
                let outcome = hook.evaluate(cycle, last.as_ref()).await;
                if !outcome.noop {
                    self.deps
                        .sink
                        .emit(LoopEvent::ins_actions(cycle, &outcome.actions, self.deps.clock.now()));
                }
                outcome.actions
            }
            None => Vec::new(),
        };

        let context = CycleContext {
            cycle,
            endpoint: read_endpoint_state(self.deps.fs.as_ref(), &self.substrate).await,
            ins_actions,
            pending_messages: std::mem::take(&mut self.pending_messages),
            metrics: self.metrics.clone(),
        };

        let decision = self.deps.roles.ego.decide(&context).await;
        let mut result = match decision {
            Ok(EgoDecision::Dispatch(task)) => self.dispatch(cycle, task, &context).await,
            Ok(EgoDecision::Idle) => self.idle(cycle, &context).await,
            Err(e) => {
                log::error!("orchestrator: cycle {} decision failed: {}", cycle, e);
                self.metrics.record_failure();
                CycleResult::idle(cycle, false, e.to_string())
            }
        };

        let interval = self.config.superego_audit_interval;
        if interval > 0 && cycle % interval == 0 {
            self.audit(cycle).await;
        }

        if let Some((watchdog, _)) = &self.watchdog {
            watchdog.record_activity();
        }
        if let Err(e) = self.schedulers.run_due().await {
            log::warn!("orchestrator: scheduler run failed: {}", e);
        }

        let finished = self.deps.clock.now();
        result.duration_ms = (finished - started).num_milliseconds().max(0) as u64;
        self.deps
            .sink
            .emit(LoopEvent::metrics_updated(&self.metrics, finished));
        self.deps.sink.emit(LoopEvent::cycle_complete(&result, finished));
        log::debug!(
            "orchestrator: cycle {} {:?} success={} ({}ms)",
            cycle,
            result.action,
            result.success,
            result.duration_ms
        );
        result
    }

    async fn dispatch(&mut self, cycle: u64, task: TaskDispatch, context: &CycleContext) -> CycleResult {
        log::info!("orchestrator: cycle {} dispatching {}", cycle, task.task_id);
        let (outcome, write_ok) = match self.run_task(cycle, &task, context).await {
            Ok(done) => done,
            Err(e) => {
                log::error!("orchestrator: cycle {} task {} failed: {}", cycle, task.task_id, e);
                (TaskOutcome::new(TaskResult::Failure, e.to_string()), true)
            }
        };

        // Follow-ups from the previous dispatch settle before new ones queue.
        self.deferred.drain().await;
        if !outcome.proposals.is_empty() {
            let superego = self.deps.roles.superego.clone();
            let proposals = outcome.proposals.clone();
            self.deferred
                .enqueue(async move { superego.evaluate_proposals(proposals).await });
        }

        let success = write_ok && outcome.result != TaskResult::Failure;
        if success {
            self.metrics.record_success();
        } else {
            self.metrics.record_failure();
        }
        self.last_task = Some(LastTaskResult::new(outcome.result, outcome.summary.clone()));

        CycleResult {
            cycle_number: cycle,
            action: CycleAction::Dispatch,
            task_id: Some(task.task_id),
            success,
            summary: outcome.summary,
            duration_ms: 0,
        }
    }

    /// Session plus mutations, holding the admission permit throughout.
    async fn run_task(
        &self,
        cycle: u64,
        task: &TaskDispatch,
        context: &CycleContext,
    ) -> Result<(TaskOutcome, bool)> {
        let subconscious = self.deps.roles.subconscious.clone();
        let mut permit = self.gate.acquire().await?;

        let session_config = subconscious.prepare_session(task, context).await?;
        let session = self.deps.sessions.run(&session_config).await;
        let now = self.deps.clock.now();
        for entry in &session.entries {
            self.deps.sink.emit(LoopEvent::session_log(cycle, entry, now));
        }

        let outcome = if session.success {
            subconscious.interpret(task, &session).await?
        } else {
            let error = session.error.clone().unwrap_or_else(|| "session failed".to_string());
            TaskOutcome::new(TaskResult::Failure, error)
        };

        let mut write_ok = true;
        for mutation in &outcome.mutations {
            let mut guard = self.locks.acquire(mutation.file).await;
            if let Err(e) = self.deps.writer.apply(mutation).await {
                log::error!("orchestrator: cycle {} write to {} failed: {}", cycle, mutation.file, e);
                write_ok = false;
            }
            guard.release();
        }

        permit.release();
        Ok((outcome, write_ok))
    }

    async fn idle(&mut self, cycle: u64, context: &CycleContext) -> CycleResult {
        self.metrics.record_idle();
        let consecutive = self.metrics.consecutive_idle_cycles;
        self.deps
            .sink
            .emit(LoopEvent::idle(cycle, consecutive, self.deps.clock.now()));

        match self.deps.roles.id.generate_drives(context).await {
            Ok(drives) => {
                if !drives.is_empty() {
                    log::debug!("orchestrator: cycle {} collected {} drive(s)", cycle, drives.len());
                }
                self.pending_messages
                    .extend(drives.into_iter().map(|d| format!("[Id drive] {}", d)));
            }
            Err(e) => log::warn!("orchestrator: cycle {} drive generation failed: {}", cycle, e),
        }

        CycleResult::idle(cycle, true, format!("idle ({} consecutive)", consecutive))
    }

    async fn audit(&mut self, cycle: u64) {
        match self.deps.roles.superego.audit(cycle).await {
            Ok(report) => {
                self.metrics.record_audit();
                log::info!("orchestrator: cycle {} audit: {}", cycle, report.summary);
                self.deps.sink.emit(LoopEvent::audit_complete(
                    cycle,
                    &report.summary,
                    self.deps.clock.now(),
                ));
            }
            Err(e) => log::warn!("orchestrator: cycle {} audit failed: {}", cycle, e),
        }
    }
}
