use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use braid_core::error::{BraidError, GraphViolation, Result};

use super::edge::GraphEdge;
use super::node::{BranchMode, FlowOp, GraphNode, InputValue, NodeKind, VariableOp};

/// Which context map holds a variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    Global,
    Scene,
    #[default]
    Node,
    Local,
}

/// A declared graph variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(rename = "type", default = "default_var_type")]
    pub var_type: String,
    #[serde(default)]
    pub scope: VariableScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<InputValue>,
}

fn default_var_type() -> String {
    "any".to_string()
}

impl VariableDef {
    pub fn new(name: impl Into<String>, scope: VariableScope) -> Self {
        Self {
            name: name.into(),
            var_type: default_var_type(),
            scope,
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<InputValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_type(mut self, var_type: impl Into<String>) -> Self {
        self.var_type = var_type.into();
        self
    }
}

/// A logic graph document as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicGraph {
    pub graph_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl LogicGraph {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            version: default_version(),
            description: None,
            variables: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a graph document from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDef> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Reject the graph with every violation found, or accept it.
    pub fn check(&self) -> Result<()> {
        let violations = self.validate();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(BraidError::GraphLoad {
                graph_id: self.graph_id.clone(),
                violations,
            })
        }
    }

    /// Collect every structural problem in the document.
    pub fn validate(&self) -> Vec<GraphViolation> {
        let mut violations = Vec::new();

        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                violations.push(GraphViolation::DuplicateNode(node.id.clone()));
            }
        }

        let mut var_names = HashSet::new();
        for var in &self.variables {
            if !var_names.insert(var.name.as_str()) {
                violations.push(GraphViolation::DuplicateVariable(var.name.clone()));
            }
            if let Some(source) = var.default.as_ref().and_then(InputValue::as_expr) {
                check_expression(&format!("variable:{}", var.name), source, &mut violations);
            }
        }

        let mut data_pins: HashMap<(&str, &str), usize> = HashMap::new();
        for (index, edge) in self.edges.iter().enumerate() {
            for endpoint in [&edge.from, &edge.to] {
                if !node_ids.contains(endpoint.as_str()) {
                    violations.push(GraphViolation::DanglingEdge {
                        index,
                        node_id: endpoint.clone(),
                    });
                }
            }
            if edge.is_data() {
                let count = data_pins
                    .entry((edge.to.as_str(), edge.to_pin.as_str()))
                    .or_default();
                *count += 1;
                if *count == 2 {
                    violations.push(GraphViolation::DuplicateDataEdge {
                        node_id: edge.to.clone(),
                        pin: edge.to_pin.clone(),
                    });
                }
            }
        }

        for node in &self.nodes {
            for (_, input) in node.static_inputs() {
                if let Some(source) = input.as_expr() {
                    check_expression(&node.id, source, &mut violations);
                }
            }
            let has_edge = |pin: &str| data_pins.contains_key(&(node.id.as_str(), pin));
            let missing = |field: &str| GraphViolation::MissingField {
                node_id: node.id.clone(),
                field: field.to_string(),
            };

            match &node.kind {
                NodeKind::Signal { signal, .. } => {
                    if signal.trim().is_empty() {
                        violations.push(GraphViolation::EmptySignal(node.id.clone()));
                    }
                }
                NodeKind::Action { action, .. } => {
                    if action.trim().is_empty() {
                        violations.push(missing("action"));
                    }
                }
                NodeKind::Branch {
                    mode,
                    condition,
                    value,
                    ..
                } => match mode {
                    BranchMode::If if condition.is_none() && !has_edge("condition") => {
                        violations.push(missing("condition"))
                    }
                    BranchMode::Switch if value.is_none() && !has_edge("value") => {
                        violations.push(missing("value"))
                    }
                    _ => {}
                },
                NodeKind::Flow {
                    op,
                    duration,
                    items,
                    ..
                } => match op {
                    FlowOp::Delay if duration.is_none() && !has_edge("duration") => {
                        violations.push(missing("duration"))
                    }
                    FlowOp::ForEach if items.is_none() && !has_edge("items") => {
                        violations.push(missing("items"))
                    }
                    _ => {}
                },
                NodeKind::Variable {
                    op,
                    variable,
                    value,
                } => {
                    if !var_names.contains(variable.as_str()) {
                        violations.push(GraphViolation::UndeclaredVariable {
                            node_id: node.id.clone(),
                            variable: variable.clone(),
                        });
                    }
                    if *op == VariableOp::Set && value.is_none() && !has_edge("value") {
                        violations.push(missing("value"));
                    }
                }
                NodeKind::SubGraph {
                    graph,
                    input_mappings,
                    output_mappings,
                    ..
                } => {
                    if graph.trim().is_empty() {
                        violations.push(missing("graph"));
                    }
                    for source in input_mappings.values() {
                        check_expression(&node.id, source, &mut violations);
                    }
                    for target in output_mappings.values() {
                        if !var_names.contains(target.as_str()) {
                            violations.push(GraphViolation::UndeclaredVariable {
                                node_id: node.id.clone(),
                                variable: target.clone(),
                            });
                        }
                    }
                }
            }
        }

        violations
    }
}

fn check_expression(node_id: &str, source: &str, violations: &mut Vec<GraphViolation>) {
    if let Err(e) = braid_expr::parse(source) {
        violations.push(GraphViolation::InvalidExpression {
            node_id: node_id.to_string(),
            expression: source.to_string(),
            message: e.to_string(),
        });
    }
}
