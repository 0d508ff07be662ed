//! Bounded counting admission gate.
//!
//! Caps the number of concurrent backend sessions so that cycle work and
//! overlapping conversational work never saturate upstream rate limits.
//! Waiters are admitted strictly in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{LoopError, Result};

/// Default number of concurrent sessions.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// FIFO counting gate. Cloning shares the same underlying slots.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    max: usize,
    waiting: Arc<AtomicUsize>,
}

/// Release capability for one admission. Releasing twice has no extra effect;
/// dropping an unreleased permit releases it.
#[derive(Debug)]
pub struct AdmissionPermit {
    permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionPermit {
    /// Give the slot back. Only the first call has effect.
    pub fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            drop(permit);
        }
    }

    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

impl AdmissionGate {
    /// Create a gate admitting at most `max` holders (minimum 1).
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            waiting: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a slot. Grants immediately when one is free, otherwise
    /// queues behind earlier callers.
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            return Ok(AdmissionPermit { permit: Some(permit) });
        }

        let _waiting = WaitingGuard::enter(&self.waiting);
        log::debug!("gate: all {} slots busy, queueing", self.max);
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LoopError::InvalidState("admission gate closed".into()))?;
        Ok(AdmissionPermit { permit: Some(permit) })
    }

    /// Number of holders currently admitted.
    pub fn active(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }

    /// Number of callers queued for a slot.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max
    }
}
