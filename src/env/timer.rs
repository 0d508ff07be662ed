//! Interruptible delay used between cycles.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

/// Delay that can be cut short by `wake()`.
#[async_trait]
pub trait Timer: Send + Sync {
    /// Suspend for `duration` or until woken.
    async fn delay(&self, duration: Duration);

    /// Resolve every pending delay immediately. With none pending, the next
    /// delay returns at once.
    fn wake(&self);
}

/// Tokio-backed timer.
#[derive(Debug, Default)]
pub struct TokioTimer {
    notify: Notify,
    woken: AtomicBool,
}

impl TokioTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Timer for TokioTimer {
    async fn delay(&self, duration: Duration) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.woken.swap(false, Ordering::SeqCst) {
            log::debug!("timer: delay skipped, woken before it started");
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = notified => {
                self.woken.store(false, Ordering::SeqCst);
                log::debug!("timer: delay woken early");
            }
        }
    }

    fn wake(&self) {
        self.woken.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

/// Timer whose delays complete at once; records what was requested.
#[derive(Debug, Default)]
pub struct ImmediateTimer {
    calls: Mutex<Vec<Duration>>,
}

impl ImmediateTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl Timer for ImmediateTimer {
    async fn delay(&self, duration: Duration) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(duration);
        // Let other tasks observe the loop between cycles.
        tokio::task::yield_now().await;
    }

    fn wake(&self) {}
}
