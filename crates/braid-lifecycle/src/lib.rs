//! Node lifecycle: a finite state machine gating when a node may run, with
//! retry/backoff on failed initialization and depth-first teardown.

pub mod backoff;
pub mod manager;
pub mod state;

pub use backoff::BackoffExt;
pub use manager::{construction_script, ConstructionArgs, ConstructionScript, InitOptions, LifecycleManager};
pub use state::{DisposeReason, LifecycleState, NodeLifecycleInfo};
