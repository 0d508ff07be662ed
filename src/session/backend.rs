//! Backend session seam.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::types::{SessionMessage, UserMessage};
use crate::error::Result;

/// Options handed to the factory when a session is opened.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionOptions {
    pub system_prompt: String,
    pub model: Option<String>,
    pub cwd: Option<PathBuf>,
    pub bypass_permissions: bool,
    pub persist_session: bool,
}

/// One live conversation with the reasoning backend.
///
/// Output is pulled with `next_message` until it returns `None`. Input is
/// pushed by handing `stream_input` a stream that ends when the caller is
/// done injecting.
#[async_trait]
pub trait Session: Send + Sync {
    /// Next output event, `None` once the session has finished or been closed.
    async fn next_message(&self) -> Option<Result<SessionMessage>>;

    /// Forward every item of `input` into the session until the stream ends.
    async fn stream_input(&self, input: BoxStream<'static, UserMessage>) -> Result<()>;

    /// Terminate the session. Pending and future `next_message` calls end.
    fn close(&self);
}

/// Opens sessions for a prompt.
pub trait SessionFactory: Send + Sync {
    fn open(&self, prompt: &str, options: SessionOptions) -> Arc<dyn Session>;
}
