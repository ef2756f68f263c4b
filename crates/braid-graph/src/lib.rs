//! Logic graph interpreter.
//!
//! A [`LogicGraph`] document is validated and indexed into a [`GraphRuntime`],
//! which executes against a per-entity [`GraphContext`]. [`GraphExecutor`]
//! owns one runtime/context pair per entity and binds signal nodes to the
//! event bus.

pub mod bridge;
pub mod builtin;
pub mod context;
pub mod entities;
pub mod executor;
pub mod graph;
pub mod runtime;

pub use bridge::{ComponentRegistry, FnComponent, GraphRegistry};
pub use context::{GraphContext, WatchNotice};
pub use entities::InMemoryEntities;
pub use executor::GraphExecutor;
pub use graph::{
    BranchMode, FlowOp, GraphEdge, GraphNode, InputValue, JoinMode, LogicGraph, NodeKind,
    VariableDef, VariableOp, VariableScope,
};
pub use runtime::{GraphRuntime, SignalBinding};
