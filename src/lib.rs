//! subloop - unattended cycle orchestration for a file-backed agent substrate
//!
//! subloop drives a cognitive loop through repeated cycles of
//! rule check, decide, dispatch-or-idle, record and schedule, with the
//! concurrency primitives, stall detection and periodic maintenance that
//! let it run without supervision.

pub mod config;
pub mod daemon;
pub mod env;
pub mod error;
pub mod ins;
pub mod scheduler;
pub mod session;
pub mod substrate;
pub mod sync;
pub mod watchdog;

pub use error::{LoopError, Result};
