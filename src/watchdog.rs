//! Stall watchdog.
//!
//! Tracks the last time the loop made progress. Once inactivity crosses the
//! stall threshold a reminder is injected into the running session, once per
//! stall. If configured, a stall that persists a further threshold past the
//! reminder requests a restart, also once per stall. Recording activity
//! starts a new episode.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::config::WatchdogConfig;
use crate::env::Clock;
use crate::session::SessionManager;

/// Injected into the session when a stall is detected.
pub const STALL_REMINDER: &str = "[Watchdog] It's been a while since any progress was logged. \
This is a gentle reminder: revisit your PLAN.md for pending tasks, \
and your VALUES.md and ID.md for your drives and goals. \
If you're blocked, consider updating PLAN.md with what's blocking you \
and look for an alternative path forward.";

pub type InjectFn = Arc<dyn Fn(&str) + Send + Sync>;
pub type RestartFn = Arc<dyn Fn() + Send + Sync>;

/// What a single `check` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallCheck {
    Idle,
    ReminderSent,
    RestartRequested,
}

#[derive(Debug, Default)]
struct WatchdogState {
    last_activity: Option<DateTime<Utc>>,
    reminder_sent_at: Option<DateTime<Utc>>,
    restart_requested: bool,
}

pub struct Watchdog {
    clock: Arc<dyn Clock>,
    inject: InjectFn,
    stall_threshold: Duration,
    force_restart: Option<(RestartFn, Duration)>,
    state: Mutex<WatchdogState>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    pub fn new(clock: Arc<dyn Clock>, inject: InjectFn, stall_threshold: Duration) -> Self {
        Self {
            clock,
            inject,
            stall_threshold,
            force_restart: None,
            state: Mutex::new(WatchdogState::default()),
            ticker: Mutex::new(None),
        }
    }

    /// Build from config; the restart callback is only wired if a threshold is set.
    pub fn from_config(
        config: &WatchdogConfig,
        clock: Arc<dyn Clock>,
        inject: InjectFn,
        restart: Option<RestartFn>,
    ) -> Self {
        let dog = Self::new(clock, inject, Duration::from_millis(config.stall_threshold_ms));
        match (restart, config.force_restart_threshold_ms) {
            (Some(restart), Some(ms)) if ms > 0 => dog.with_force_restart(restart, Duration::from_millis(ms)),
            _ => dog,
        }
    }

    /// Build from config, injecting reminders into whatever session `sessions` is running.
    pub fn for_sessions(
        config: &WatchdogConfig,
        clock: Arc<dyn Clock>,
        sessions: Arc<SessionManager>,
        restart: Option<RestartFn>,
    ) -> Self {
        let inject: InjectFn = Arc::new(move |message: &str| {
            if !sessions.inject(message) {
                log::debug!("watchdog: stall reminder dropped, no session accepted it");
            }
        });
        Self::from_config(config, clock, inject, restart)
    }

    pub fn with_force_restart(mut self, restart: RestartFn, after_reminder: Duration) -> Self {
        self.force_restart = Some((restart, after_reminder));
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, WatchdogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark progress and start a fresh stall episode.
    pub fn record_activity(&self) {
        let mut state = self.lock_state();
        state.last_activity = Some(self.clock.now());
        state.reminder_sent_at = None;
        state.restart_requested = false;
    }

    pub fn check(&self) -> StallCheck {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let Some(last) = state.last_activity else {
            return StallCheck::Idle;
        };
        let elapsed = (now - last).to_std().unwrap_or_default();

        let reminder_sent_at = state.reminder_sent_at;
        match reminder_sent_at {
            None => {
                if elapsed < self.stall_threshold {
                    return StallCheck::Idle;
                }
                log::info!(
                    "watchdog: no activity for {}s (threshold {}s), injecting stall reminder",
                    elapsed.as_secs(),
                    self.stall_threshold.as_secs()
                );
                state.reminder_sent_at = Some(now);
                drop(state);
                (self.inject)(STALL_REMINDER);
                StallCheck::ReminderSent
            }
            Some(reminded) => {
                let Some((restart, after)) = &self.force_restart else {
                    return StallCheck::Idle;
                };
                if state.restart_requested {
                    return StallCheck::Idle;
                }
                let since_reminder = (now - reminded).to_std().unwrap_or_default();
                if since_reminder < *after {
                    return StallCheck::Idle;
                }
                log::warn!(
                    "watchdog: stall persists {}s total ({}s since reminder), requesting restart",
                    elapsed.as_secs(),
                    since_reminder.as_secs()
                );
                state.restart_requested = true;
                drop(state);
                restart();
                StallCheck::RestartRequested
            }
        }
    }

    /// Run `check` every `interval` on a background task, replacing any running one.
    ///
    /// A zero interval is raised to one millisecond.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        self.stop();
        let interval = interval.max(Duration::from_millis(1));
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let Some(dog) = weak.upgrade() else {
                    break;
                };
                dog.check();
            }
        });
        *self.ticker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(handle) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
