//! Fire-and-forget follow-up work with a drain barrier.
//!
//! A cycle hands post-processing here so it overlaps with the next cycle's
//! critical path; `drain()` guarantees it has settled before a later
//! synchronization point such as shutdown.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::error::{LoopError, Result};

/// Callback receiving failures of deferred work.
pub type ErrorHandler = Arc<dyn Fn(&LoopError) + Send + Sync>;

#[derive(Default)]
pub struct DeferredWork {
    pending: Mutex<Vec<JoinHandle<()>>>,
    on_error: Option<ErrorHandler>,
}

impl DeferredWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_handler(on_error: ErrorHandler) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            on_error: Some(on_error),
        }
    }

    /// Start `work` in the background. Its failure is reported to the error
    /// handler and never reaches the caller.
    pub fn enqueue<F>(&self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let on_error = self.on_error.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = work.await {
                report(on_error.as_ref(), &err);
            }
        });
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    /// Await everything enqueued before this call. Work enqueued while
    /// draining is left for the next drain.
    pub async fn drain(&self) {
        let batch = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|e| e.into_inner()));
        if batch.is_empty() {
            return;
        }
        log::debug!("deferred: draining {} unit(s)", batch.len());
        for joined in join_all(batch).await {
            if let Err(join_err) = joined {
                let err = LoopError::Deferred(join_err.to_string());
                report(self.on_error.as_ref(), &err);
            }
        }
    }

    /// Units enqueued and not yet drained.
    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn report(on_error: Option<&ErrorHandler>, err: &LoopError) {
    match on_error {
        Some(handler) => handler(err),
        None => log::debug!("deferred: unit failed: {}", err),
    }
}
