//! Event sinks.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::event::LoopEvent;

/// Receives loop events. Fire-and-forget: emitting never fails the loop.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LoopEvent);
}

/// Records every event, for tests and the CLI.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<LoopEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LoopEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<LoopEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: LoopEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

/// Publishes events to any number of live subscribers (e.g. a UI socket).
/// Slow subscribers lag and lose the oldest events.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<LoopEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: LoopEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

/// Forwards each event to every inner sink, in order.
#[derive(Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: LoopEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Value;

    fn event(t: &str) -> LoopEvent {
        LoopEvent::new(t, Utc::now(), Value::Null)
    }

    #[test]
    fn test_in_memory_filters_by_type() {
        let sink = InMemoryEventSink::new();
        sink.emit(event("idle"));
        sink.emit(event("cycle_complete"));
        sink.emit(event("idle"));
        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.of_type("idle").len(), 2);
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscribers() {
        let sink = BroadcastEventSink::new(16);
        sink.emit(event("dropped"));

        let mut rx = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 1);
        sink.emit(event("seen"));
        assert_eq!(rx.recv().await.unwrap().event_type, "seen");
    }

    #[test]
    fn test_fanout() {
        let a = Arc::new(InMemoryEventSink::new());
        let b = Arc::new(InMemoryEventSink::new());
        let fanout = FanoutEventSink::new(vec![a.clone() as Arc<dyn EventSink>, b.clone() as Arc<dyn EventSink>]);
        fanout.emit(event("x"));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events().len(), 1);
    }
}
