//! Concurrency primitives guarding scarce resources.
//!
//! These are the only synchronization points the loop relies on:
//! - **AdmissionGate**: caps concurrent backend sessions (FIFO admission)
//! - **ResourceLock**: serializes mutation of one substrate file at a time
//! - **DeferredWork**: fire-and-forget follow-up with a drain barrier
//!
//! Callers must never hold two `ResourceLock` keys in an order that could
//! form a cycle; the primitive itself does not detect deadlock.

mod deferred;
mod gate;
mod resource_lock;

pub use deferred::{DeferredWork, ErrorHandler};
pub use gate::{AdmissionGate, AdmissionPermit, DEFAULT_MAX_CONCURRENT};
pub use resource_lock::{ResourceGuard, ResourceLock};
