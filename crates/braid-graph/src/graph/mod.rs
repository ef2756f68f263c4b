//! Logic graph documents: nodes, edges, variable declarations and load-time validation.

pub mod document;
pub mod edge;
pub mod node;

pub use document::{LogicGraph, VariableDef, VariableScope};
pub use edge::GraphEdge;
pub use node::{BranchMode, FlowOp, GraphNode, InputValue, JoinMode, NodeKind, VariableOp};
