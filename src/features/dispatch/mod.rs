//! Dispatch layer.
//!
//! Decides per call whether to execute now or queue, and runs
//! registry-described quick actions.

pub mod actions;
pub mod channel;
pub mod helpers;
pub mod usage;

pub use actions::{
    ActionDefinition, ActionExecutor, ActionKind, ActionRegistry, ActionResult, Navigator,
    QueuedAction,
};
pub use channel::{ActionRequest, ServerChannel};
pub use helpers::{DispatchOutcome, Dispatcher};
pub use usage::{ActionUsage, UsageRecord, UsageTracker};
