//! Mocks, builders and fixtures shared by Braid integration tests.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use braid_core::error::{BraidError, Result};
use braid_core::event::{handler, BusEvent, EventBus, EventPhase, SubscribeOptions};
use braid_core::traits::{ActionInputs, Component};
use braid_core::value::Value;
use braid_graph::{
    FlowOp, GraphEdge, GraphNode, InputValue, JoinMode, LogicGraph, NodeKind, VariableDef,
    VariableOp, VariableScope,
};

// ---------------------------------------------------------------------------
// RecordingComponent
// ---------------------------------------------------------------------------

/// One recorded action call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub action: String,
    pub inputs: ActionInputs,
}

/// Shared view of the calls a [`RecordingComponent`] received.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.0.lock().unwrap().iter().map(|c| c.action.clone()).collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|c| c.action == action).count()
    }

    /// Inputs of the most recent call to `action`.
    pub fn last(&self, action: &str) -> Option<ActionInputs> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.action == action)
            .map(|c| c.inputs.clone())
    }
}

#[derive(Clone)]
enum Reply {
    Value(Value),
    Fail(String),
}

/// A component that records every call and answers with canned replies.
///
/// Actions without a configured reply return `null`.
pub struct RecordingComponent {
    name: String,
    replies: HashMap<String, Reply>,
    delays: HashMap<String, Duration>,
    log: CallLog,
}

impl RecordingComponent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            replies: HashMap::new(),
            delays: HashMap::new(),
            log: CallLog::default(),
        }
    }

    /// Declare `action`, answering with `value`.
    pub fn returning(mut self, action: &str, value: impl Into<Value>) -> Self {
        self.replies.insert(action.to_string(), Reply::Value(value.into()));
        self
    }

    /// Declare `action`, failing with `message`.
    pub fn failing(mut self, action: &str, message: &str) -> Self {
        self.replies.insert(action.to_string(), Reply::Fail(message.to_string()));
        self
    }

    /// Sleep before answering `action`.
    pub fn delayed(mut self, action: &str, ms: u64) -> Self {
        self.replies
            .entry(action.to_string())
            .or_insert(Reply::Value(Value::Null));
        self.delays.insert(action.to_string(), Duration::from_millis(ms));
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

impl Component for RecordingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.replies.keys().cloned().collect();
        names.sort();
        names
    }

    fn invoke(&self, action: &str, inputs: ActionInputs) -> BoxFuture<'_, Result<Value>> {
        self.log.0.lock().unwrap().push(RecordedCall {
            action: action.to_string(),
            inputs,
        });
        let reply = self.replies.get(action).cloned();
        let delay = self.delays.get(action).copied();
        let action = action.to_string();
        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match reply {
                Some(Reply::Value(v)) => Ok(v),
                Some(Reply::Fail(message)) => Err(BraidError::Action {
                    component: "recording".to_string(),
                    action,
                    message,
                }),
                None => Ok(Value::Null),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// EventRecorder
// ---------------------------------------------------------------------------

/// A delivered event as seen by an [`EventRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub event_type: String,
    pub source: String,
    pub phase: EventPhase,
    pub data: Value,
}

/// Records every delivery of the given event types, across all phases.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    /// Subscribe unscoped handlers for `event_types`.
    pub fn attach(bus: &EventBus, event_types: &[&str]) -> Self {
        Self::attach_with(bus, event_types, SubscribeOptions::default())
    }

    /// Subscribe handlers scoped to `node_id`.
    pub fn attach_to_node(bus: &EventBus, node_id: &str, event_types: &[&str]) -> Self {
        Self::attach_with(bus, event_types, SubscribeOptions::node(node_id))
    }

    fn attach_with(bus: &EventBus, event_types: &[&str], opts: SubscribeOptions) -> Self {
        let recorder = Self::default();
        for event_type in event_types {
            for phase in EventPhase::ALL {
                let events = recorder.events.clone();
                bus.on(
                    *event_type,
                    phase,
                    handler(move |event: Arc<BusEvent>| {
                        let events = events.clone();
                        async move {
                            events.lock().unwrap().push(RecordedEvent {
                                event_type: event.event_type.clone(),
                                source: event.source.id.clone(),
                                phase,
                                data: event.data.clone(),
                            });
                        }
                    }),
                    opts.clone(),
                );
            }
        }
        recorder
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Deliveries of `event_type` in the execute phase.
    pub fn executed(&self, event_type: &str) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type && e.phase == EventPhase::Execute)
            .cloned()
            .collect()
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.executed(event_type).len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

// ---------------------------------------------------------------------------
// GraphBuilder
// ---------------------------------------------------------------------------

/// Fluent construction of [`LogicGraph`] documents.
pub struct GraphBuilder {
    graph: LogicGraph,
}

impl GraphBuilder {
    pub fn new(graph_id: &str) -> Self {
        Self {
            graph: LogicGraph::new(graph_id),
        }
    }

    /// Declare a node-scope variable.
    pub fn var(self, name: &str, default: impl Into<Value>) -> Self {
        self.scoped_var(name, VariableScope::Node, default)
    }

    pub fn scoped_var(mut self, name: &str, scope: VariableScope, default: impl Into<Value>) -> Self {
        self.graph
            .variables
            .push(VariableDef::new(name, scope).with_default(default.into()));
        self
    }

    pub fn node(mut self, node: GraphNode) -> Self {
        self.graph.nodes.push(node);
        self
    }

    pub fn signal(self, id: &str, signal: &str) -> Self {
        self.node(GraphNode::signal(id, signal))
    }

    /// `Variable(set)` node writing the result of `expr`.
    pub fn set(self, id: &str, variable: &str, expr: &str) -> Self {
        self.node(GraphNode::variable(
            id,
            VariableOp::Set,
            variable,
            Some(InputValue::expr(expr)),
        ))
    }

    pub fn get(self, id: &str, variable: &str) -> Self {
        self.node(GraphNode::variable(id, VariableOp::Get, variable, None))
    }

    pub fn watch(self, id: &str, variable: &str) -> Self {
        self.node(GraphNode::variable(id, VariableOp::Watch, variable, None))
    }

    pub fn branch(self, id: &str, condition: &str) -> Self {
        self.node(GraphNode::branch_if(id, InputValue::expr(condition)))
    }

    pub fn switch(self, id: &str, value: &str, cases: &[&str]) -> Self {
        self.node(GraphNode::switch(id, InputValue::expr(value), cases))
    }

    pub fn action(
        self,
        id: &str,
        component: Option<&str>,
        action: &str,
        inputs: &[(&'static str, InputValue)],
    ) -> Self {
        self.node(GraphNode::action(id, component, action, inputs.iter().cloned()))
    }

    pub fn delay(self, id: &str, ms: u64) -> Self {
        let mut node = GraphNode::flow(id, FlowOp::Delay);
        if let NodeKind::Flow { duration, .. } = &mut node.kind {
            *duration = Some(InputValue::literal(ms as f64));
        }
        self.node(node)
    }

    pub fn for_each(self, id: &str, items: &str, item_var: Option<&str>) -> Self {
        let mut node = GraphNode::flow(id, FlowOp::ForEach);
        if let NodeKind::Flow {
            items: slot,
            item_var: var,
            ..
        } = &mut node.kind
        {
            *slot = Some(InputValue::expr(items));
            *var = item_var.map(str::to_string);
        }
        self.node(node)
    }

    pub fn parallel(self, id: &str, branches: &[&str], join: JoinMode) -> Self {
        let mut node = GraphNode::flow(id, FlowOp::Parallel);
        if let NodeKind::Flow {
            branches: slot,
            join_mode,
            ..
        } = &mut node.kind
        {
            *slot = branches.iter().map(|b| b.to_string()).collect();
            *join_mode = join;
        }
        self.node(node)
    }

    pub fn cancel(self, id: &str) -> Self {
        self.node(GraphNode::flow(id, FlowOp::Cancel))
    }

    /// `SubGraph` node. Mappings are `(child var, parent expr)` and
    /// `(child var, parent var)` pairs.
    pub fn subgraph(
        self,
        id: &str,
        graph: &str,
        inputs: &[(&str, &str)],
        outputs: &[(&str, &str)],
        isolated: bool,
    ) -> Self {
        let pairs = |list: &[(&str, &str)]| {
            list.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        self.node(GraphNode::new(
            id,
            NodeKind::SubGraph {
                graph: graph.to_string(),
                input_mappings: pairs(inputs),
                output_mappings: pairs(outputs),
                isolated,
            },
        ))
    }

    pub fn flow(mut self, from: &str, to: &str) -> Self {
        self.graph.edges.push(GraphEdge::flow(from, to));
        self
    }

    /// Chain `ids` with flow edges, in order.
    pub fn chain(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.graph.edges.push(GraphEdge::flow(pair[0], pair[1]));
        }
        self
    }

    pub fn pin(mut self, from: &str, pin: &str, to: &str) -> Self {
        self.graph.edges.push(GraphEdge::pin(from, pin, to));
        self
    }

    pub fn data(mut self, from: &str, from_pin: &str, to: &str, to_pin: &str) -> Self {
        self.graph.edges.push(GraphEdge::data(from, from_pin, to, to_pin));
        self
    }

    pub fn build(self) -> LogicGraph {
        self.graph
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A small door graph in document form: `Open` toggles `open` and counts
/// uses, a watch on `open` logs the change.
pub const DOOR_GRAPH_JSON: &str = r#"{
  "graphId": "door",
  "version": "1.0.0",
  "description": "Toggles a door and counts uses",
  "variables": [
    { "name": "open", "type": "boolean", "scope": "node", "default": false },
    { "name": "uses", "type": "number", "scope": "node", "default": 0 },
    { "name": "label", "type": "string", "scope": "node", "default": "" }
  ],
  "nodes": [
    { "id": "on_open", "type": "signal", "signal": "Open" },
    { "id": "toggle", "type": "variable", "op": "set", "variable": "open", "value": { "$expr": "!open" } },
    { "id": "count", "type": "variable", "op": "set", "variable": "uses", "value": { "$expr": "uses + 1" } },
    { "id": "on_change", "type": "variable", "op": "watch", "variable": "open" },
    { "id": "describe", "type": "variable", "op": "set", "variable": "label", "value": { "$expr": "newValue ? 'open' : 'closed'" } }
  ],
  "edges": [
    { "from": "on_open", "to": "toggle" },
    { "from": "toggle", "to": "count" },
    { "from": "on_change", "to": "describe" }
  ]
}"#;

/// Write `graph` as JSON to a temporary file.
pub fn temp_graph_file(graph: &LogicGraph) -> tempfile::NamedTempFile {
    let json = serde_json::to_string_pretty(graph).unwrap();
    temp_file(&json, ".json")
}

/// Write TOML `content` to a temporary config file.
pub fn temp_config(content: &str) -> tempfile::NamedTempFile {
    temp_file(content, ".toml")
}

fn temp_file(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_door_fixture_is_valid() {
        let graph = LogicGraph::from_json(DOOR_GRAPH_JSON).unwrap();
        assert!(graph.validate().is_empty());
        assert_eq!(graph.nodes.len(), 5);
    }

    #[test]
    fn test_builder_produces_valid_graph() {
        let graph = GraphBuilder::new("built")
            .var("n", 0)
            .signal("start", "Go")
            .set("a", "n", "n + 1")
            .set("b", "n", "n * 2")
            .chain(&["start", "a", "b"])
            .build();
        assert!(graph.validate().is_empty());
        assert_eq!(graph.edges.len(), 2);
    }

    #[tokio::test]
    async fn test_recording_component() {
        let component = RecordingComponent::new("gadget")
            .returning("ping", true)
            .failing("boom", "nope");
        let log = component.log();
        assert_eq!(component.actions(), vec!["boom".to_string(), "ping".to_string()]);

        let out = component.invoke("ping", ActionInputs::new()).await.unwrap();
        assert_eq!(out, Value::Bool(true));
        assert!(component.invoke("boom", ActionInputs::new()).await.is_err());
        assert_eq!(log.actions(), vec!["ping".to_string(), "boom".to_string()]);
    }
}
