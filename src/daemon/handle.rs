//! Control handle for a running loop.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::env::Timer;
use crate::session::SessionManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopCommand {
    Pause,
    Resume,
    Stop,
    Message(String),
}

/// Cloneable sender of loop commands. Commands are applied at the top of
/// the next loop iteration; `stop` and `resume` also cut the current
/// inter-cycle delay short.
#[derive(Clone)]
pub struct LoopHandle {
    tx: mpsc::UnboundedSender<LoopCommand>,
    timer: Arc<dyn Timer>,
    sessions: Arc<SessionManager>,
}

impl LoopHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<LoopCommand>,
        timer: Arc<dyn Timer>,
        sessions: Arc<SessionManager>,
    ) -> Self {
        Self { tx, timer, sessions }
    }

    pub fn pause(&self) -> bool {
        self.send(LoopCommand::Pause)
    }

    pub fn resume(&self) -> bool {
        let sent = self.send(LoopCommand::Resume);
        self.timer.wake();
        sent
    }

    pub fn stop(&self) -> bool {
        let sent = self.send(LoopCommand::Stop);
        self.sessions.stop();
        self.timer.wake();
        sent
    }

    /// Deliver to the active session if there is one, otherwise queue for
    /// the next cycle's context.
    pub fn inject(&self, message: &str) -> bool {
        if self.sessions.inject(message) {
            log::debug!("handle: injected into active session");
            return true;
        }
        self.send(LoopCommand::Message(message.to_string()))
    }

    fn send(&self, command: LoopCommand) -> bool {
        match self.tx.send(command) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("handle: loop gone, dropped {:?}", e.0);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{FixedClock, ImmediateTimer};
    use crate::session::InMemorySessionFactory;
    use chrono::Utc;

    fn handle() -> (LoopHandle, mpsc::UnboundedReceiver<LoopCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(SessionManager::new(
            Arc::new(InMemorySessionFactory::new()),
            Arc::new(FixedClock::new(Utc::now())),
        ));
        (LoopHandle::new(tx, Arc::new(ImmediateTimer::new()), sessions), rx)
    }

    #[test]
    fn test_commands_arrive_in_order() {
        let (handle, mut rx) = handle();
        assert!(handle.pause());
        assert!(handle.resume());
        assert!(handle.stop());
        assert_eq!(rx.try_recv().unwrap(), LoopCommand::Pause);
        assert_eq!(rx.try_recv().unwrap(), LoopCommand::Resume);
        assert_eq!(rx.try_recv().unwrap(), LoopCommand::Stop);
    }

    #[test]
    fn test_inject_without_session_queues_message() {
        let (handle, mut rx) = handle();
        assert!(handle.inject("hello"));
        assert_eq!(rx.try_recv().unwrap(), LoopCommand::Message("hello".to_string()));
    }

    #[test]
    fn test_send_after_loop_dropped() {
        let (handle, rx) = handle();
        drop(rx);
        assert!(!handle.pause());
    }
}
