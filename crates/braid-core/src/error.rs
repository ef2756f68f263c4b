use thiserror::Error;

#[derive(Debug, Error)]
pub enum BraidError {
    // Expression errors
    #[error("Syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Evaluation error: {0}")]
    Eval(String),

    // Action errors
    #[error("Action failed: {component}.{action}: {message}")]
    Action {
        component: String,
        action: String,
        message: String,
    },

    // Lifecycle errors
    #[error("Lifecycle error on node {node_id}: {message}")]
    Lifecycle { node_id: String, message: String },

    // Graph errors
    #[error("Graph '{graph_id}' failed to load: {}", format_violations(.violations))]
    GraphLoad {
        graph_id: String,
        violations: Vec<GraphViolation>,
    },

    #[error("Graph not registered: {0}")]
    UnknownGraph(String),

    #[error("Node not found in graph: {0}")]
    UnknownNode(String),

    #[error("No graph loaded for entity: {0}")]
    UnknownEntity(String),

    #[error("Variable not declared: {0}")]
    UnknownVariable(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BraidError {
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }

    pub fn lifecycle(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lifecycle {
            node_id: node_id.into(),
            message: message.into(),
        }
    }
}

/// A single problem found while loading a graph document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphViolation {
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("duplicate variable '{0}'")]
    DuplicateVariable(String),

    #[error("edge #{index} references missing node '{node_id}'")]
    DanglingEdge { index: usize, node_id: String },

    #[error("pin '{pin}' of node '{node_id}' has more than one incoming data edge")]
    DuplicateDataEdge { node_id: String, pin: String },

    #[error("node '{node_id}' references undeclared variable '{variable}'")]
    UndeclaredVariable { node_id: String, variable: String },

    #[error("node '{node_id}' has an invalid expression '{expression}': {message}")]
    InvalidExpression {
        node_id: String,
        expression: String,
        message: String,
    },

    #[error("signal node '{0}' has an empty signal name")]
    EmptySignal(String),

    #[error("node '{node_id}' is missing required field '{field}'")]
    MissingField { node_id: String, field: String },
}

fn format_violations(violations: &[GraphViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, BraidError>;
