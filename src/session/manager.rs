//! Session manager: one backend session at a time.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{Session, SessionFactory, SessionOptions};
use super::channel::MessageChannel;
use super::types::{LogEntry, SessionMessage, UserMessage};
use crate::env::Clock;

/// Callback receiving every classified transcript entry as it arrives.
pub type LogObserver = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// What to run in a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub initial_prompt: String,
    pub cwd: Option<PathBuf>,
    pub model: Option<String>,
}

impl SessionConfig {
    pub fn new(system_prompt: impl Into<String>, initial_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            initial_prompt: initial_prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn options(&self) -> SessionOptions {
        SessionOptions {
            system_prompt: self.system_prompt.clone(),
            model: self.model.clone(),
            cwd: self.cwd.clone(),
            bypass_permissions: true,
            persist_session: false,
        }
    }
}

/// Outcome of one session run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionResult {
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub entries: Vec<LogEntry>,
}

impl SessionResult {
    fn rejected(reason: &str) -> Self {
        Self {
            success: false,
            error: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

struct ActiveSession {
    session: Arc<dyn Session>,
    channel: Arc<MessageChannel<UserMessage>>,
}

/// Runs sessions against a factory and relays injected input into them.
///
/// INACTIVE until `run` opens a session, and INACTIVE again once that
/// session's output ends, fails, or `stop` closes it.
pub struct SessionManager {
    factory: Arc<dyn SessionFactory>,
    clock: Arc<dyn Clock>,
    observer: Option<LogObserver>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn SessionFactory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            factory,
            clock,
            observer: None,
            active: Mutex::new(None),
        }
    }

    pub fn with_observer(mut self, observer: LogObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_active(&self) -> bool {
        self.lock_active().is_some()
    }

    /// Run one session to completion.
    ///
    /// A session without a terminal result event counts as a success.
    pub async fn run(&self, config: &SessionConfig) -> SessionResult {
        let started = self.clock.now();
        let channel = Arc::new(MessageChannel::new());

        let session = {
            let mut active = self.lock_active();
            if active.is_some() {
                log::warn!("session run rejected: a session is already active");
                return SessionResult::rejected("a session is already active");
            }
            let session = self.factory.open(&config.initial_prompt, config.options());
            *active = Some(ActiveSession {
                session: session.clone(),
                channel: channel.clone(),
            });
            session
        };
        log::debug!("session started");

        let relay = {
            let session = session.clone();
            let input = channel.clone().into_stream();
            tokio::spawn(async move {
                if let Err(e) = session.stream_input(input).await {
                    log::warn!("session input relay ended with error: {}", e);
                }
            })
        };

        let mut entries = Vec::new();
        let mut success = true;
        let mut error = None;

        while let Some(next) = session.next_message().await {
            match next {
                Ok(message) => {
                    for entry in message.log_entries() {
                        self.observe(&entry);
                        entries.push(entry);
                    }
                    if let SessionMessage::Result(result) = &message {
                        success = result.is_success();
                        error = (!success).then(|| result.error_detail());
                    }
                }
                Err(e) => {
                    log::warn!("session output failed: {}", e);
                    success = false;
                    error = Some(e.to_string());
                    break;
                }
            }
        }

        if !channel.is_closed() {
            channel.close();
        }
        session.close();
        if let Err(e) = relay.await {
            log::warn!("session input relay panicked: {}", e);
        }
        self.lock_active().take();

        let duration_ms = (self.clock.now() - started).num_milliseconds().max(0) as u64;
        log::debug!("session finished: success={} duration={}ms", success, duration_ms);
        SessionResult {
            success,
            duration_ms,
            error,
            entries,
        }
    }

    fn observe(&self, entry: &LogEntry) {
        log::debug!("[{}] {}", entry.kind, entry.content);
        if let Some(observer) = &self.observer {
            observer(entry);
        }
    }

    /// Push a message into the running session. Returns whether it was queued.
    pub fn inject(&self, message: &str) -> bool {
        let active = self.lock_active();
        let Some(active) = active.as_ref() else {
            log::debug!("inject ignored: no active session");
            return false;
        };
        match active.channel.push(UserMessage::injected(message)) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("inject ignored: {}", e);
                false
            }
        }
    }

    /// Close the running session, if any. Safe from any state.
    pub fn stop(&self) {
        let active = self.lock_active();
        if let Some(active) = active.as_ref() {
            active.session.close();
            if !active.channel.is_closed() {
                active.channel.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::FixedClock;
    use crate::error::LoopError;
    use crate::session::{InMemorySession, InMemorySessionFactory, LogEntryKind, ResultMessage};
    use chrono::{Duration, TimeZone, Utc};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()))
    }

    fn manager_with(session: InMemorySession) -> (SessionManager, Arc<InMemorySessionFactory>, Arc<InMemorySession>) {
        let factory = Arc::new(InMemorySessionFactory::new());
        let session = Arc::new(session);
        factory.enqueue(session.clone());
        let manager = SessionManager::new(factory.clone(), clock());
        (manager, factory, session)
    }

    #[tokio::test]
    async fn test_run_success_collects_entries() {
        let (manager, factory, _) = manager_with(InMemorySession::new(vec![
            Ok(SessionMessage::assistant_text("working")),
            Ok(SessionMessage::Result(ResultMessage::success())),
        ]));

        let result = manager.run(&SessionConfig::new("sys", "go").with_model("sonnet")).await;

        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.entries[0].kind, LogEntryKind::Text);
        assert!(!manager.is_active());

        let (prompt, options) = &factory.opened()[0];
        assert_eq!(prompt, "go");
        assert_eq!(options.system_prompt, "sys");
        assert_eq!(options.model.as_deref(), Some("sonnet"));
        assert!(options.bypass_permissions);
        assert!(!options.persist_session);
    }

    #[tokio::test]
    async fn test_failed_result_reports_error_detail() {
        let (manager, _, _) = manager_with(InMemorySession::new(vec![Ok(SessionMessage::Result(
            ResultMessage::error("error_during_execution", vec!["tool crashed".into(), "gave up".into()]),
        ))]));

        let result = manager.run(&SessionConfig::new("sys", "go")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("tool crashed; gave up"));
    }

    #[tokio::test]
    async fn test_stream_error_marks_failure() {
        let (manager, _, _) = manager_with(InMemorySession::new(vec![
            Ok(SessionMessage::assistant_text("partial")),
            Err(LoopError::Session("connection reset".into())),
            Ok(SessionMessage::assistant_text("never seen")),
        ]));

        let result = manager.run(&SessionConfig::new("sys", "go")).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Session error: connection reset"));
        assert_eq!(result.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_result_counts_as_success() {
        let (manager, _, _) = manager_with(InMemorySession::new(vec![Ok(SessionMessage::assistant_text("hi"))]));
        let result = manager.run(&SessionConfig::new("sys", "go")).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_duration_and_observer() {
        let clock = clock();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let factory = Arc::new(InMemorySessionFactory::new());
        factory.enqueue(Arc::new(InMemorySession::new(vec![
            Ok(SessionMessage::assistant_text("a")),
            Ok(SessionMessage::assistant_text("b")),
        ])));

        let observer: LogObserver = {
            let seen = seen.clone();
            let clock = clock.clone();
            Arc::new(move |entry: &LogEntry| {
                seen.lock().unwrap().push(entry.content.clone());
                clock.advance(Duration::milliseconds(250));
            })
        };
        let manager = SessionManager::new(factory, clock.clone()).with_observer(observer);

        let result = manager.run(&SessionConfig::new("sys", "go")).await;
        assert_eq!(result.duration_ms, 500);
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_inject_when_inactive_is_noop() {
        let manager = SessionManager::new(Arc::new(InMemorySessionFactory::new()), clock());
        assert!(!manager.inject("hello?"));
        manager.stop();
    }

    #[tokio::test]
    async fn test_inject_reaches_active_session_and_stop_ends_it() {
        let (manager, _, session) = manager_with(InMemorySession::new(vec![]).hold_open());
        let manager = Arc::new(manager);

        let run = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run(&SessionConfig::new("sys", "go")).await })
        };
        while !manager.is_active() {
            tokio::task::yield_now().await;
        }

        assert!(manager.inject("operator note"));
        manager.stop();
        let result = run.await.unwrap();

        assert!(result.success);
        assert!(session.is_closed());
        let received = session.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].content, "operator note");
        assert_eq!(received[0].session_id, "injected");
        assert!(!manager.inject("too late"));
    }

    #[tokio::test]
    async fn test_second_concurrent_run_is_rejected() {
        let (manager, _, _) = manager_with(InMemorySession::new(vec![]).hold_open());
        let manager = Arc::new(manager);

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run(&SessionConfig::new("sys", "one")).await })
        };
        while !manager.is_active() {
            tokio::task::yield_now().await;
        }

        let second = manager.run(&SessionConfig::new("sys", "two")).await;
        assert!(!second.success);
        assert_eq!(second.error.as_deref(), Some("a session is already active"));

        manager.stop();
        assert!(first.await.unwrap().success);
    }
}
