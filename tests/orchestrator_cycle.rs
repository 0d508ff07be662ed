//! Orchestrator integration tests
//!
//! Drives the cycle loop end to end with scripted roles, the in-memory
//! filesystem and an immediate timer.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use subloop::config::{InsConfig, LoopConfig, WatchdogConfig};
use subloop::daemon::{
    AuditReport, CycleAction, CycleContext, CycleMetrics, Ego, EgoDecision, Id, InMemoryEventSink, LoopDeps,
    LoopOrchestrator, LoopState, Roles, Subconscious, Superego, TaskDispatch, TaskOutcome, event_types,
};
use subloop::env::{FileSystem, FixedClock, ImmediateTimer, InMemoryFileSystem};
use subloop::error::{LoopError, Result};
use subloop::ins::{ComplianceStore, InsHook, TaskResult};
use subloop::session::{InMemorySession, InMemorySessionFactory, SessionConfig, SessionManager, SessionResult};
use subloop::scheduler::{HealthCheck, HealthCheckScheduler, SchedulerCoordinator};
use subloop::substrate::{FsSubstrateWriter, SubstrateFile, SubstrateMutation};
use subloop::watchdog::{STALL_REMINDER, StallCheck, Watchdog};

const SUBSTRATE: &str = "/substrate";
const STATE: &str = "/state";

/// Ego that replays a decision script, then idles, recording every context.
#[derive(Default)]
struct ScriptedEgo {
    decisions: Mutex<Vec<EgoDecision>>,
    seen: Mutex<Vec<CycleContext>>,
}

#[async_trait]
impl Ego for ScriptedEgo {
    async fn decide(&self, context: &CycleContext) -> Result<EgoDecision> {
        self.seen.lock().unwrap().push(context.clone());
        let mut decisions = self.decisions.lock().unwrap();
        if decisions.is_empty() {
            Ok(EgoDecision::Idle)
        } else {
            Ok(decisions.remove(0))
        }
    }
}

/// Subconscious that hands back scripted outcomes in order.
#[derive(Default)]
struct ScriptedSubconscious {
    outcomes: Mutex<Vec<TaskOutcome>>,
}

#[async_trait]
impl Subconscious for ScriptedSubconscious {
    async fn prepare_session(&self, task: &TaskDispatch, context: &CycleContext) -> Result<SessionConfig> {
        Ok(SessionConfig::new("You are the subconscious.", format!("{}\n\n{}", context.briefing(), task.description)))
    }

    async fn interpret(&self, _task: &TaskDispatch, _session: &SessionResult) -> Result<TaskOutcome> {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            Ok(TaskOutcome::new(TaskResult::Success, "done"))
        } else {
            Ok(outcomes.remove(0))
        }
    }
}

#[derive(Default)]
struct RecordingSuperego {
    evaluated: Mutex<Vec<String>>,
    audits: Mutex<Vec<u64>>,
}

#[async_trait]
impl Superego for RecordingSuperego {
    async fn audit(&self, cycle: u64) -> Result<AuditReport> {
        self.audits.lock().unwrap().push(cycle);
        Ok(AuditReport {
            summary: format!("audit at {}", cycle),
            findings: vec![],
        })
    }

    async fn evaluate_proposals(&self, proposals: Vec<String>) -> Result<()> {
        self.evaluated.lock().unwrap().extend(proposals);
        Ok(())
    }
}

struct FixedDrives(Vec<String>);

#[async_trait]
impl Id for FixedDrives {
    async fn generate_drives(&self, _context: &CycleContext) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

struct FailingEgo;

#[async_trait]
impl Ego for FailingEgo {
    async fn decide(&self, _context: &CycleContext) -> Result<EgoDecision> {
        Err(LoopError::role("Ego", "no answer"))
    }
}

struct Harness {
    fs: Arc<InMemoryFileSystem>,
    sink: Arc<InMemoryEventSink>,
    timer: Arc<ImmediateTimer>,
    factory: Arc<InMemorySessionFactory>,
    ego: Arc<ScriptedEgo>,
    subconscious: Arc<ScriptedSubconscious>,
    superego: Arc<RecordingSuperego>,
}

impl Harness {
    fn new() -> Self {
        Self {
            fs: Arc::new(InMemoryFileSystem::new()),
            sink: Arc::new(InMemoryEventSink::new()),
            timer: Arc::new(ImmediateTimer::new()),
            factory: Arc::new(InMemorySessionFactory::new()),
            ego: Arc::new(ScriptedEgo::default()),
            subconscious: Arc::new(ScriptedSubconscious::default()),
            superego: Arc::new(RecordingSuperego::default()),
        }
    }

    fn script(self, decisions: Vec<EgoDecision>, outcomes: Vec<TaskOutcome>) -> Self {
        *self.ego.decisions.lock().unwrap() = decisions;
        *self.subconscious.outcomes.lock().unwrap() = outcomes;
        self
    }

    fn deps(&self, ego: Arc<dyn Ego>, drives: Vec<String>) -> LoopDeps {
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
        LoopDeps {
            clock: clock.clone(),
            timer: self.timer.clone(),
            sink: self.sink.clone(),
            fs: self.fs.clone(),
            sessions: Arc::new(SessionManager::new(self.factory.clone(), clock)),
            writer: Arc::new(FsSubstrateWriter::new(self.fs.clone(), SUBSTRATE)),
            roles: Roles {
                ego,
                subconscious: self.subconscious.clone(),
                superego: self.superego.clone(),
                id: Arc::new(FixedDrives(drives)),
            },
        }
    }

    fn orchestrator(&self, config: LoopConfig) -> LoopOrchestrator {
        LoopOrchestrator::new(config, SUBSTRATE, self.deps(self.ego.clone(), vec![]))
    }

    async fn with_ins(&self, orchestrator: LoopOrchestrator, ins: InsConfig) -> LoopOrchestrator {
        let fs: Arc<dyn FileSystem> = self.fs.clone();
        let (store, _) = ComplianceStore::load(fs.clone(), STATE).await;
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
        orchestrator.with_ins(InsHook::new(fs, clock, SUBSTRATE, ins, store))
    }
}

fn config() -> LoopConfig {
    LoopConfig {
        cycle_delay_ms: 10,
        max_consecutive_idle_cycles: 100,
        superego_audit_interval: 1000,
        ..LoopConfig::default()
    }
}

fn dispatch(id: &str) -> EgoDecision {
    EgoDecision::Dispatch(TaskDispatch::new(id, format!("work on {}", id)))
}

fn partial(summary: &str) -> TaskOutcome {
    TaskOutcome::new(TaskResult::Partial, summary)
}

fn compliance_flags(sink: &InMemoryEventSink) -> Vec<serde_json::Value> {
    sink.of_type(event_types::INS_ACTIONS)
        .into_iter()
        .flat_map(|e| e.data["actions"].as_array().cloned().unwrap_or_default())
        .filter(|a| a["kind"] == "compliance_flag")
        .collect()
}

#[tokio::test]
async fn test_ceiling_halts_loop() {
    let harness = Harness::new();
    let metrics = CycleMetrics {
        total_cycles: 50,
        successful_cycles: 50,
        ..CycleMetrics::default()
    };
    let mut orch = harness.orchestrator(config()).with_metrics(metrics);

    assert!(orch.start());
    orch.run_loop().await.unwrap();

    assert_eq!(orch.state(), LoopState::Stopped);
    assert_eq!(orch.metrics().total_cycles, 50);
    assert!(harness.ego.seen.lock().unwrap().is_empty());

    let ceiling = harness.sink.of_type(event_types::SAFETY_CEILING);
    assert_eq!(ceiling.len(), 1);
    assert_eq!(ceiling[0].data["halted"], true);

    let cycles = harness.sink.of_type(event_types::CYCLE_COMPLETE);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].data["action"], "idle");
}

#[tokio::test]
async fn test_caution_band_warns_and_continues() {
    let harness = Harness::new();
    let metrics = CycleMetrics {
        successful_cycles: 30,
        ..CycleMetrics::default()
    };
    let mut orch = harness.orchestrator(config()).with_metrics(metrics);
    orch.start();

    let result = orch.execute_one_cycle().await;

    assert_eq!(orch.state(), LoopState::Running);
    assert_eq!(result.action, CycleAction::Idle);
    let ceiling = harness.sink.of_type(event_types::SAFETY_CEILING);
    assert_eq!(ceiling.len(), 1);
    assert_eq!(ceiling[0].data["halted"], false);
}

#[tokio::test]
async fn test_below_caution_no_ceiling_event() {
    let harness = Harness::new();
    let metrics = CycleMetrics {
        successful_cycles: 29,
        ..CycleMetrics::default()
    };
    let mut orch = harness.orchestrator(config()).with_metrics(metrics);
    orch.start();
    orch.execute_one_cycle().await;
    assert!(harness.sink.of_type(event_types::SAFETY_CEILING).is_empty());
}

#[tokio::test]
async fn test_consecutive_partials_raise_compliance_flag() {
    let harness = Harness::new().script(
        vec![dispatch("a"), dispatch("b"), dispatch("c")],
        vec![partial("blocked by X"), partial("blocked by X"), partial("blocked by X")],
    );
    let orch = harness.orchestrator(config());
    let mut orch = harness.with_ins(orch, InsConfig::default()).await;
    orch.start();

    for _ in 0..3 {
        orch.execute_one_cycle().await;
    }
    assert!(compliance_flags(&harness.sink).is_empty());

    orch.execute_one_cycle().await;
    let flags = compliance_flags(&harness.sink);
    assert_eq!(flags.len(), 1);
    assert_eq!(flags[0]["target"], "Ego");
    assert_eq!(flags[0]["flagged_pattern"], "X");
    assert!(flags[0]["detail"].as_str().unwrap().contains("\"X\""));

    // The flag reaches the Ego in the same cycle.
    let seen = harness.ego.seen.lock().unwrap();
    assert_eq!(seen[3].ins_actions.len(), 1);

    // Partials still count as successful cycles.
    assert_eq!(orch.metrics().successful_cycles, 3);
    let persisted = harness.fs.read_to_string(Path::new("/state/compliance.json")).await.unwrap();
    assert!(persisted.contains("\"X\""));
}

#[tokio::test]
async fn test_success_between_partials_resets_counter() {
    let harness = Harness::new().script(
        vec![dispatch("a"), dispatch("b"), dispatch("c"), dispatch("d")],
        vec![
            partial("blocked by X"),
            partial("blocked by X"),
            TaskOutcome::new(TaskResult::Success, "finished"),
            partial("blocked by X"),
        ],
    );
    let orch = harness.orchestrator(config());
    let mut orch = harness.with_ins(orch, InsConfig::default()).await;
    orch.start();

    for _ in 0..5 {
        orch.execute_one_cycle().await;
    }
    assert!(compliance_flags(&harness.sink).is_empty());
}

#[tokio::test]
async fn test_idle_cycle_does_not_recount_partial() {
    let harness = Harness::new().script(vec![dispatch("a")], vec![partial("waiting for review")]);
    let orch = harness.orchestrator(config());
    let mut orch = harness.with_ins(orch, InsConfig {
        consecutive_partial_threshold: 2,
        ..InsConfig::default()
    })
    .await;
    orch.start();

    for _ in 0..4 {
        orch.execute_one_cycle().await;
    }
    assert!(compliance_flags(&harness.sink).is_empty());
}

#[tokio::test]
async fn test_dispatch_applies_mutations() {
    let outcome = TaskOutcome::new(TaskResult::Success, "planned")
        .with_mutation(SubstrateMutation::write(SubstrateFile::Plan, "# Plan\n- [ ] next\n"))
        .with_mutation(SubstrateMutation::append(SubstrateFile::Progress, "- planned\n"));
    let harness = Harness::new().script(vec![dispatch("plan")], vec![outcome]);
    let mut orch = harness.orchestrator(config());
    orch.start();

    let result = orch.execute_one_cycle().await;

    assert!(result.success);
    assert_eq!(result.task_id.as_deref(), Some("plan"));
    let plan = harness.fs.read_to_string(Path::new("/substrate/PLAN.md")).await.unwrap();
    assert_eq!(plan, "# Plan\n- [ ] next\n");
    let progress = harness.fs.read_to_string(Path::new("/substrate/PROGRESS.md")).await.unwrap();
    assert_eq!(progress, "- planned\n");
    assert_eq!(harness.factory.opened().len(), 1);
    assert!(!harness.sink.of_type(event_types::SESSION_LOG).is_empty());
}

#[tokio::test]
async fn test_rejected_mutation_fails_cycle() {
    let outcome = TaskOutcome::new(TaskResult::Success, "rewrote history")
        .with_mutation(SubstrateMutation::write(SubstrateFile::Progress, "gone\n"));
    let harness = Harness::new().script(vec![dispatch("bad")], vec![outcome]);
    let mut orch = harness.orchestrator(config());
    orch.start();

    let result = orch.execute_one_cycle().await;

    assert!(!result.success);
    assert_eq!(orch.metrics().failed_cycles, 1);
    assert_eq!(orch.state(), LoopState::Running);
}

#[tokio::test]
async fn test_failed_session_is_failed_cycle() {
    let harness = Harness::new().script(vec![dispatch("a")], vec![]);
    harness.factory.enqueue(Arc::new(InMemorySession::new(vec![Err(LoopError::Session(
        "stream dropped".into(),
    ))])));
    let mut orch = harness.orchestrator(config());
    orch.start();

    let result = orch.execute_one_cycle().await;

    assert!(!result.success);
    assert!(result.summary.contains("stream dropped"));
    assert_eq!(orch.metrics().failed_cycles, 1);
    let completed = harness.sink.of_type(event_types::CYCLE_COMPLETE);
    assert_eq!(completed[0].data["success"], false);
}

#[tokio::test]
async fn test_decision_failure_is_failed_cycle() {
    let harness = Harness::new();
    let mut orch = LoopOrchestrator::new(config(), SUBSTRATE, harness.deps(Arc::new(FailingEgo), vec![]));
    orch.start();

    let result = orch.execute_one_cycle().await;
    assert!(!result.success);
    assert_eq!(orch.metrics().failed_cycles, 1);
}

#[tokio::test]
async fn test_proposals_drained_before_loop_returns() {
    let outcome = TaskOutcome::new(TaskResult::Success, "done").with_proposal("compact memory");
    let harness = Harness::new().script(vec![dispatch("a")], vec![outcome]);
    let mut orch = harness.orchestrator(LoopConfig {
        max_consecutive_idle_cycles: 1,
        ..config()
    });

    orch.start();
    orch.run_loop().await.unwrap();

    assert_eq!(orch.deferred_len(), 0);
    assert_eq!(*harness.superego.evaluated.lock().unwrap(), vec!["compact memory".to_string()]);
}

#[tokio::test]
async fn test_max_idle_cycles_stops_loop() {
    let harness = Harness::new();
    let mut orch = harness.orchestrator(LoopConfig {
        max_consecutive_idle_cycles: 3,
        ..config()
    });

    orch.start();
    orch.run_loop().await.unwrap();

    assert_eq!(orch.state(), LoopState::Stopped);
    assert_eq!(orch.metrics().idle_cycles, 3);
    assert_eq!(harness.sink.of_type(event_types::CYCLE_COMPLETE).len(), 3);
    assert_eq!(harness.timer.calls().len(), 2);
}

#[tokio::test]
async fn test_idle_drives_reach_next_context() {
    let harness = Harness::new();
    let mut orch = LoopOrchestrator::new(
        config(),
        SUBSTRATE,
        harness.deps(harness.ego.clone(), vec!["explore the archive".to_string()]),
    );
    orch.start();

    orch.execute_one_cycle().await;
    orch.execute_one_cycle().await;

    let seen = harness.ego.seen.lock().unwrap();
    assert!(seen[0].pending_messages.is_empty());
    assert_eq!(seen[1].pending_messages, vec!["[Id drive] explore the archive".to_string()]);
}

#[tokio::test]
async fn test_endpoint_state_reaches_context() {
    let harness = Harness::new();
    harness
        .fs
        .write(
            Path::new("/substrate/.endpoint_state.json"),
            r#"{"status":"down","lastSeen":"2026-01-01T00:00:00Z","consecutiveDown":4}"#,
        )
        .await
        .unwrap();
    let mut orch = harness.orchestrator(config());
    orch.start();
    orch.execute_one_cycle().await;

    let seen = harness.ego.seen.lock().unwrap();
    assert!(seen[0].briefing().contains("Skip ALL inference-gated tasks"));
}

#[tokio::test]
async fn test_handle_pause_resume_stop() {
    let harness = Harness::new();
    let mut orch = harness.orchestrator(config());
    let handle = orch.handle();

    assert!(handle.inject("hello from the operator"));
    assert!(handle.pause());

    let task = tokio::spawn(async move {
        orch.start();
        orch.run_loop().await.unwrap();
        orch
    });

    while !harness
        .sink
        .of_type(event_types::STATE_CHANGED)
        .iter()
        .any(|e| e.data["to"] == "PAUSED")
    {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(harness.sink.of_type(event_types::CYCLE_COMPLETE).is_empty());

    assert!(handle.resume());
    while harness.sink.of_type(event_types::CYCLE_COMPLETE).is_empty() {
        tokio::task::yield_now().await;
    }
    handle.stop();

    let orch = task.await.unwrap();
    assert_eq!(orch.state(), LoopState::Stopped);
    let seen = harness.ego.seen.lock().unwrap();
    assert_eq!(seen[0].pending_messages, vec!["hello from the operator".to_string()]);
}

#[tokio::test]
async fn test_due_schedulers_run_after_cycle() {
    let harness = Harness::new();
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    let health = HealthCheckScheduler::new(
        HealthCheck::for_substrate(harness.fs.clone(), SUBSTRATE),
        clock,
        std::time::Duration::from_secs(3600),
    );
    let mut orch = harness
        .orchestrator(config())
        .with_schedulers(SchedulerCoordinator::new(vec![Box::new(health)]));
    orch.start();

    orch.execute_one_cycle().await;
    orch.execute_one_cycle().await;

    let statuses = orch.schedule_statuses();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].name, "health-check");
    assert_eq!(statuses[0].run_count, 1);
}

#[tokio::test]
async fn test_watchdog_follows_loop_lifecycle() {
    let harness = Harness::new();
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    let injected = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = injected.clone();
    let watchdog = Arc::new(Watchdog::new(
        clock,
        Arc::new(move |message: &str| sink.lock().unwrap().push(message.to_string())),
        std::time::Duration::from_secs(1200),
    ));
    let mut orch = harness
        .orchestrator(config())
        .with_watchdog(watchdog.clone(), std::time::Duration::from_secs(60));

    orch.start();
    assert!(watchdog.is_running());
    orch.execute_one_cycle().await;
    orch.stop();

    assert!(!watchdog.is_running());
    assert!(injected.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_watchdog_reminds_and_restarts_running_session() {
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
    let factory = Arc::new(InMemorySessionFactory::new());
    let session = Arc::new(InMemorySession::new(Vec::new()).hold_open());
    factory.enqueue(session.clone());
    let sessions = Arc::new(SessionManager::new(factory, clock.clone()));

    let running = {
        let sessions = sessions.clone();
        tokio::spawn(async move { sessions.run(&SessionConfig::new("system", "go")).await })
    };
    while !sessions.is_active() {
        tokio::task::yield_now().await;
    }

    let config = WatchdogConfig {
        stall_threshold_ms: 60_000,
        check_interval_ms: 1_000,
        force_restart_threshold_ms: Some(30_000),
    };
    let target = sessions.clone();
    let watchdog = Watchdog::for_sessions(&config, clock.clone(), sessions.clone(), Some(Arc::new(move || target.stop())));
    watchdog.record_activity();

    clock.advance(chrono::Duration::seconds(61));
    assert_eq!(watchdog.check(), StallCheck::ReminderSent);
    for _ in 0..100 {
        if !session.received().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    let received = session.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].content, STALL_REMINDER);
    assert_eq!(received[0].session_id, "injected");

    clock.advance(chrono::Duration::seconds(30));
    assert_eq!(watchdog.check(), StallCheck::RestartRequested);
    let result = running.await.unwrap();
    assert!(session.is_closed());
    assert!(result.success);
    assert!(!sessions.is_active());
}

#[tokio::test]
async fn test_audit_every_n_cycles() {
    let harness = Harness::new();
    let mut orch = harness.orchestrator(LoopConfig {
        superego_audit_interval: 2,
        ..config()
    });
    orch.start();

    for _ in 0..5 {
        orch.execute_one_cycle().await;
    }

    assert_eq!(*harness.superego.audits.lock().unwrap(), vec![2, 4]);
    assert_eq!(orch.metrics().superego_audits, 2);
}
