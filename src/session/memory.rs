//! Scripted in-memory session for tests and dry runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::Notify;

use super::backend::{Session, SessionFactory, SessionOptions};
use super::types::{ResultMessage, SessionMessage, UserMessage};
use crate::error::Result;

/// Replays a fixed list of output messages and records streamed input.
///
/// With `hold_open`, the output stays open after the script is exhausted
/// until `close()` is called, which simulates a long-running session.
#[derive(Debug, Default)]
pub struct InMemorySession {
    script: Mutex<VecDeque<Result<SessionMessage>>>,
    hold_open: bool,
    closed: AtomicBool,
    closed_notify: Notify,
    received: Mutex<Vec<UserMessage>>,
}

impl InMemorySession {
    pub fn new(script: Vec<Result<SessionMessage>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    /// A session that reports a single successful result.
    pub fn succeeding() -> Self {
        Self::new(vec![Ok(SessionMessage::Result(ResultMessage::success()))])
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Input messages streamed into this session so far.
    pub fn received(&self) -> Vec<UserMessage> {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn next_message(&self) -> Option<Result<SessionMessage>> {
        loop {
            let woken = self.closed_notify.notified();
            if self.is_closed() {
                return None;
            }
            if let Some(next) = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front() {
                return Some(next);
            }
            if !self.hold_open {
                return None;
            }
            woken.await;
        }
    }

    async fn stream_input(&self, mut input: BoxStream<'static, UserMessage>) -> Result<()> {
        while let Some(message) = input.next().await {
            self.received.lock().unwrap_or_else(|e| e.into_inner()).push(message);
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closed_notify.notify_waiters();
    }
}

/// Hands out queued sessions in order; falls back to a succeeding session.
#[derive(Debug, Default)]
pub struct InMemorySessionFactory {
    queue: Mutex<VecDeque<Arc<InMemorySession>>>,
    opened: Mutex<Vec<(String, SessionOptions)>>,
}

impl InMemorySessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, session: Arc<InMemorySession>) {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).push_back(session);
    }

    /// Every `(prompt, options)` pair a session was opened with.
    pub fn opened(&self) -> Vec<(String, SessionOptions)> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SessionFactory for InMemorySessionFactory {
    fn open(&self, prompt: &str, options: SessionOptions) -> Arc<dyn Session> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((prompt.to_string(), options));
        let next = self.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        match next {
            Some(session) => session,
            None => Arc::new(InMemorySession::succeeding()),
        }
    }
}
