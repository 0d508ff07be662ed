//! Daemon Core - the cycle loop and its collaborators
//!
//! The daemon is the long-running side of subloop:
//! - **LoopOrchestrator** drives cycles and owns state and metrics
//! - **LoopHandle** lets other tasks pause, resume, stop or message it
//! - **Roles** are the decision collaborators it consults each cycle
//! - **EventSink** receives everything it has to say
//!
//! # Example
//!
//! ```ignore
//! let mut orchestrator = LoopOrchestrator::new(config.loop_, &config.paths.substrate, deps)
//!     .with_ins(hook)
//!     .with_schedulers(coordinator);
//! let handle = orchestrator.handle();
//! orchestrator.start();
//! orchestrator.run_loop().await?;
//! ```

pub mod endpoint;
pub mod event;
pub mod handle;
pub mod metrics;
pub mod orchestrator;
pub mod roles;
pub mod sink;
pub mod state;

pub use endpoint::{ENDPOINT_STATE_FILE, EndpointState, EndpointStatus, read_endpoint_state};
pub use event::{LoopEvent, event_types};
pub use handle::{LoopCommand, LoopHandle};
pub use metrics::CycleMetrics;
pub use orchestrator::{CycleAction, CycleResult, LoopDeps, LoopOrchestrator};
pub use roles::{
    AuditReport, CycleContext, Ego, EgoDecision, Id, Roles, Subconscious, Superego, TaskDispatch, TaskOutcome,
};
pub use sink::{BroadcastEventSink, EventSink, FanoutEventSink, InMemoryEventSink};
pub use state::LoopState;
