//! Pre-cycle rule engine.
//!
//! Deterministic checks that run before every cycle and never block it:
//! - **Size rules**: CONVERSATION.md and PROGRESS.md line counts,
//!   MEMORY.md character count
//! - **Consecutive partials**: the same stated precondition blocking the
//!   previous task several cycles in a row, tracked in a persisted
//!   [`ComplianceStore`]
//! - **Archive candidates**: old memory notes carrying a SUPERSEDED marker
//!
//! # Example
//!
//! ```ignore
//! let (store, _fresh) = ComplianceStore::load(fs.clone(), &state_dir).await;
//! let mut hook = InsHook::new(fs, clock, &substrate, InsConfig::default(), store);
//! let result = hook.evaluate(cycle, last_task.as_ref()).await;
//! for action in &result.actions {
//!     println!("{}", action);
//! }
//! ```

mod compliance;
mod hook;
mod types;

pub use compliance::{COMPLIANCE_FILE, ComplianceState, ComplianceStore, PartialRecord};
pub use hook::{InsHook, extract_precondition};
pub use types::{InsAction, InsActionKind, InsResult, LastTaskResult, TaskResult};
