use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use braid_core::event::EventPhase;
use braid_core::value::Value;

/// A static input: either a literal value or `{ "$expr": "<source>" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Expr {
        #[serde(rename = "$expr")]
        expr: String,
    },
    Literal(Value),
}

impl InputValue {
    pub fn expr(source: impl Into<String>) -> Self {
        InputValue::Expr {
            expr: source.into(),
        }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        InputValue::Literal(value.into())
    }

    /// Expression source, if this input is an expression.
    pub fn as_expr(&self) -> Option<&str> {
        match self {
            InputValue::Expr { expr } => Some(expr),
            InputValue::Literal(_) => None,
        }
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        InputValue::Literal(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchMode {
    #[default]
    If,
    Switch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowOp {
    Delay,
    Parallel,
    Merge,
    Sequence,
    ForEach,
    Cancel,
}

/// How a `parallel` flow node joins its branches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableOp {
    Get,
    Set,
    Watch,
}

/// A node in a logic graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique within its graph.
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Node payload, tagged by `type` in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    /// Entry point bound to an event type.
    Signal {
        signal: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        phase: Option<EventPhase>,
    },
    /// Calls `action` on `component`, or on the built-in table when no component is named.
    Action {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component: Option<String>,
        action: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        inputs: BTreeMap<String, InputValue>,
    },
    Branch {
        #[serde(default)]
        mode: BranchMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<InputValue>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<InputValue>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        cases: Vec<String>,
    },
    Flow {
        op: FlowOp,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<InputValue>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        branches: Vec<String>,
        #[serde(rename = "joinMode", default)]
        join_mode: JoinMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<InputValue>,
        #[serde(rename = "itemVar", default, skip_serializing_if = "Option::is_none")]
        item_var: Option<String>,
    },
    Variable {
        op: VariableOp,
        variable: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<InputValue>,
    },
    /// Embeds another graph by id.
    ///
    /// `input_mappings` maps child variable → parent expression;
    /// `output_mappings` maps child variable → parent variable.
    #[serde(rename = "subgraph")]
    SubGraph {
        graph: String,
        #[serde(rename = "inputMappings", default, skip_serializing_if = "BTreeMap::is_empty")]
        input_mappings: BTreeMap<String, String>,
        #[serde(rename = "outputMappings", default, skip_serializing_if = "BTreeMap::is_empty")]
        output_mappings: BTreeMap<String, String>,
        #[serde(default)]
        isolated: bool,
    },
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Signal { .. } => "signal",
            NodeKind::Action { .. } => "action",
            NodeKind::Branch { .. } => "branch",
            NodeKind::Flow { .. } => "flow",
            NodeKind::Variable { .. } => "variable",
            NodeKind::SubGraph { .. } => "subgraph",
        }
    }
}

impl GraphNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self { id: id.into(), kind }
    }

    pub fn signal(id: impl Into<String>, signal: impl Into<String>) -> Self {
        Self::new(
            id,
            NodeKind::Signal {
                signal: signal.into(),
                phase: None,
            },
        )
    }

    pub fn action(
        id: impl Into<String>,
        component: Option<&str>,
        action: impl Into<String>,
        inputs: impl IntoIterator<Item = (&'static str, InputValue)>,
    ) -> Self {
        Self::new(
            id,
            NodeKind::Action {
                component: component.map(str::to_string),
                action: action.into(),
                inputs: inputs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
            },
        )
    }

    pub fn branch_if(id: impl Into<String>, condition: InputValue) -> Self {
        Self::new(
            id,
            NodeKind::Branch {
                mode: BranchMode::If,
                condition: Some(condition),
                value: None,
                cases: Vec::new(),
            },
        )
    }

    pub fn switch(id: impl Into<String>, value: InputValue, cases: &[&str]) -> Self {
        Self::new(
            id,
            NodeKind::Branch {
                mode: BranchMode::Switch,
                condition: None,
                value: Some(value),
                cases: cases.iter().map(|c| c.to_string()).collect(),
            },
        )
    }

    /// A flow node with every optional field empty.
    pub fn flow(id: impl Into<String>, op: FlowOp) -> Self {
        Self::new(
            id,
            NodeKind::Flow {
                op,
                duration: None,
                branches: Vec::new(),
                join_mode: JoinMode::All,
                items: None,
                item_var: None,
            },
        )
    }

    pub fn variable(
        id: impl Into<String>,
        op: VariableOp,
        variable: impl Into<String>,
        value: Option<InputValue>,
    ) -> Self {
        Self::new(
            id,
            NodeKind::Variable {
                op,
                variable: variable.into(),
                value,
            },
        )
    }

    /// Every static input on this node, labelled by field name.
    pub fn static_inputs(&self) -> Vec<(&str, &InputValue)> {
        let mut out: Vec<(&str, &InputValue)> = Vec::new();
        match &self.kind {
            NodeKind::Action { inputs, .. } => {
                out.extend(inputs.iter().map(|(k, v)| (k.as_str(), v)));
            }
            NodeKind::Branch {
                condition, value, ..
            } => {
                out.extend(condition.iter().map(|v| ("condition", v)));
                out.extend(value.iter().map(|v| ("value", v)));
            }
            NodeKind::Flow {
                duration, items, ..
            } => {
                out.extend(duration.iter().map(|v| ("duration", v)));
                out.extend(items.iter().map(|v| ("items", v)));
            }
            NodeKind::Variable { value, .. } => {
                out.extend(value.iter().map(|v| ("value", v)));
            }
            NodeKind::Signal { .. } | NodeKind::SubGraph { .. } => {}
        }
        out
    }
}
