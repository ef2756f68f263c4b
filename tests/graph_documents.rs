use std::io::Write;
use std::sync::Arc;

use braid_core::error::{BraidError, GraphViolation};
use braid_core::event::EventBus;
use braid_core::value::Value;
use braid_graph::{GraphExecutor, GraphRegistry, LogicGraph};
use braid_test_utils::{temp_graph_file, GraphBuilder, DOOR_GRAPH_JSON};

#[test]
fn test_load_graph_document_from_file() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(DOOR_GRAPH_JSON.as_bytes()).expect("write json");

    let graph = LogicGraph::load(tmp.path()).expect("load graph");
    assert_eq!(graph.graph_id, "door");
    assert_eq!(graph.version, "1.0.0");
    assert_eq!(graph.variables.len(), 3);
    graph.check().expect("door graph is valid");
}

#[test]
fn test_malformed_document_lists_every_violation() {
    let json = r#"{
      "graphId": "broken",
      "variables": [
        { "name": "hp", "scope": "node", "default": 10 },
        { "name": "hp", "scope": "node" }
      ],
      "nodes": [
        { "id": "start", "type": "signal", "signal": "Go" },
        { "id": "start", "type": "signal", "signal": "Go" },
        { "id": "calc", "type": "variable", "op": "set", "variable": "mana", "value": { "$expr": "hp +" } }
      ],
      "edges": [
        { "from": "start", "to": "nowhere" }
      ]
    }"#;
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(json.as_bytes()).expect("write json");

    let graph = LogicGraph::load(tmp.path()).expect("document parses");
    let err = graph.check().unwrap_err();
    let BraidError::GraphLoad { graph_id, violations } = err else {
        panic!("expected a graph load error");
    };
    assert_eq!(graph_id, "broken");
    assert!(violations.contains(&GraphViolation::DuplicateNode("start".into())));
    assert!(violations.contains(&GraphViolation::DuplicateVariable("hp".into())));
    assert!(violations
        .iter()
        .any(|v| matches!(v, GraphViolation::DanglingEdge { node_id, .. } if node_id == "nowhere")));
    assert!(violations
        .iter()
        .any(|v| matches!(v, GraphViolation::InvalidExpression { node_id, .. } if node_id == "calc")));
    assert!(violations
        .iter()
        .any(|v| matches!(v, GraphViolation::UndeclaredVariable { variable, .. } if variable == "mana")));
}

#[test]
fn test_non_json_document_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"graphId: yaml-is-not-json").expect("write");
    assert!(matches!(
        LogicGraph::load(tmp.path()),
        Err(BraidError::Json(_))
    ));
}

#[tokio::test]
async fn test_run_graph_with_subgraph_files() {
    let child = GraphBuilder::new("scale")
        .var("input", 0)
        .var("output", 0)
        .signal("init", "Init")
        .set("calc", "output", "input * 3")
        .flow("init", "calc")
        .build();
    let parent = GraphBuilder::new("main")
        .var("base", 5)
        .var("result", 0)
        .signal("start", "Start")
        .subgraph("sub", "scale", &[("input", "base + 1")], &[("output", "result")], false)
        .flow("start", "sub")
        .build();
    let child_file = temp_graph_file(&child);
    let parent_file = temp_graph_file(&parent);

    let registry = Arc::new(GraphRegistry::new());
    registry
        .register_graph(LogicGraph::load(child_file.path()).unwrap())
        .unwrap();
    let executor = GraphExecutor::new(Arc::new(EventBus::new())).with_subgraphs(registry);
    executor
        .load_graph("hero", LogicGraph::load(parent_file.path()).unwrap())
        .unwrap();

    let handled = executor
        .trigger_signal("hero", "Start", Value::Null)
        .await
        .unwrap();
    assert_eq!(handled, 1);
    assert_eq!(executor.get_variable("hero", "result").unwrap(), Value::from(18));
}
