//! Per-resource mutual exclusion.
//!
//! Each key owns its own fair mutex, so acquisitions on the same key are
//! granted one at a time in arrival order while distinct keys never
//! interfere with each other.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed lock chain.
#[derive(Debug)]
pub struct ResourceLock<K> {
    chains: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Release capability for one key. Releasing twice has no extra effect;
/// dropping an unreleased guard releases it.
#[derive(Debug)]
pub struct ResourceGuard {
    guard: Option<OwnedMutexGuard<()>>,
}

impl ResourceGuard {
    /// Hand the key to the next waiter. Only the first call has effect.
    pub fn release(&mut self) {
        self.guard.take();
    }

    pub fn is_released(&self) -> bool {
        self.guard.is_none()
    }
}

impl<K> Default for ResourceLock<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            chains: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> ResourceLock<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn chain(&self, key: &K) -> Arc<AsyncMutex<()>> {
        let mut chains = self.chains.lock().unwrap_or_else(|e| e.into_inner());
        chains.entry(key.clone()).or_default().clone()
    }

    /// Wait until every earlier holder of `key` has released it.
    pub async fn acquire(&self, key: K) -> ResourceGuard {
        let chain = self.chain(&key);
        ResourceGuard {
            guard: Some(chain.lock_owned().await),
        }
    }

    /// Whether `key` is currently held.
    pub fn is_locked(&self, key: &K) -> bool {
        let chains = self.chains.lock().unwrap_or_else(|e| e.into_inner());
        chains.get(key).map(|m| m.try_lock().is_err()).unwrap_or(false)
    }
}
