use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use braid_core::config::LifecycleConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Constructing,
    Pending,
    Ready,
    Error,
    Disposed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Constructing => "constructing",
            LifecycleState::Pending => "pending",
            LifecycleState::Ready => "ready",
            LifecycleState::Error => "error",
            LifecycleState::Disposed => "disposed",
        }
    }

    /// Whether `self → next` is an allowed edge of the state machine.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Disposed, _) => false,
            (_, Disposed) => true,
            (Uninitialized, Constructing) => true,
            (Constructing, Pending | Error) => true,
            (Pending, Ready | Error) => true,
            (Error, Pending | Uninitialized) => true,
            _ => false,
        }
    }

    /// States from which `initialize` starts a new attempt.
    pub fn can_initialize(self) -> bool {
        matches!(self, LifecycleState::Uninitialized | LifecycleState::Error)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a node is being disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisposeReason {
    Explicit,
    /// An ancestor was disposed.
    Parent,
    /// Initialization failed and the fallback state is `dispose`.
    InitFailed,
    Shutdown,
}

impl DisposeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisposeReason::Explicit => "explicit",
            DisposeReason::Parent => "parent",
            DisposeReason::InitFailed => "initFailed",
            DisposeReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for DisposeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle record kept per registered node.
#[derive(Debug, Clone)]
pub struct NodeLifecycleInfo {
    pub state: LifecycleState,
    pub config: LifecycleConfig,
    pub parent: Option<String>,
    /// Message of the most recent failure.
    pub error: Option<String>,
    /// Failures since the last successful initialization.
    pub retry_count: u32,
    pub init_start_time: Option<Instant>,
    pub node_type: Option<String>,
}

impl NodeLifecycleInfo {
    pub fn new(config: LifecycleConfig, parent: Option<String>) -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            config,
            parent,
            error: None,
            retry_count: 0,
            init_start_time: None,
            node_type: None,
        }
    }
}
