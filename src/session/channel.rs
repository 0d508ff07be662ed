//! Single-stream asynchronous message channel.
//!
//! Items pushed before `close()` are always delivered before the consumer
//! observes end-of-stream. This is one logical stream, not a broadcast
//! topic: concurrent consumers compete for the same items. Session input
//! injection has exactly one consumer, so that is all it needs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::Notify;

use crate::error::{LoopError, Result};

#[derive(Debug)]
struct ChannelState<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

#[derive(Debug)]
pub struct MessageChannel<T> {
    state: Mutex<ChannelState<T>>,
    notify: Notify,
}

impl<T> Default for MessageChannel<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(ChannelState {
                buffer: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }
}

impl<T> MessageChannel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an item and wake a parked consumer. Fails once closed.
    pub fn push(&self, item: T) -> Result<()> {
        {
            let mut state = self.lock();
            if state.closed {
                return Err(LoopError::ChannelClosed);
            }
            state.buffer.push_back(item);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Mark end-of-stream and wake a parked consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Buffered items not yet consumed.
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next item, or `None` once the channel is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            // Registered before inspecting state so a push in between is not missed.
            let woken = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(item) = state.buffer.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            woken.await;
        }
    }
}

impl<T: Send + 'static> MessageChannel<T> {
    /// Consume the channel as a stream that ends when it is closed and drained.
    pub fn into_stream(self: Arc<Self>) -> BoxStream<'static, T> {
        stream::unfold(self, |channel| async move {
            let item = channel.recv().await?;
            Some((item, channel))
        })
        .boxed()
    }
}
