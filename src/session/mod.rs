//! Streaming session with the reasoning backend.
//!
//! This module provides:
//! - **MessageChannel**: single-consumer push/pull queue with close semantics
//! - **Message types**: backend output resolved once into closed sum types
//! - **Session / SessionFactory**: the backend seam, plus an in-memory double
//! - **SessionManager**: runs one session at a time, relays injected input
//!   and classifies output into log entries
//!
//! # Example
//!
//! ```ignore
//! let manager = SessionManager::new(factory, clock);
//! let result = manager.run(&SessionConfig::new("system", "do the task")).await;
//! // from another task, while running:
//! manager.inject("operator note");
//! ```

mod backend;
mod channel;
mod manager;
mod memory;
mod types;

pub use backend::{Session, SessionFactory, SessionOptions};
pub use channel::MessageChannel;
pub use manager::{LogObserver, SessionConfig, SessionManager, SessionResult};
pub use memory::{InMemorySession, InMemorySessionFactory};
pub use types::{
    AssistantMessage, ContentBlock, LogEntry, LogEntryKind, ResultMessage, SessionMessage, SystemMessage,
    UserMessage,
};
