use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use braid_core::error::{BraidError, Result};
use braid_core::traits::{ActionInputs, Component};
use braid_core::value::Value;

use crate::graph::LogicGraph;
use crate::runtime::GraphRuntime;

struct Registered {
    component: Arc<dyn Component>,
    actions: HashSet<String>,
}

/// Components callable from `Action` nodes, keyed by name.
///
/// Each component's action names are captured once at registration; only
/// those names are dispatched.
#[derive(Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Registered>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Replaces any component with the same name.
    pub fn register(&mut self, component: impl Component) {
        self.register_arc(Arc::new(component));
    }

    pub fn register_arc(&mut self, component: Arc<dyn Component>) {
        let name = component.name().to_string();
        let actions = component.actions().into_iter().collect();
        debug!(component = %name, "Registered component");
        self.components
            .insert(name, Registered { component, actions });
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.components.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).map(|r| r.component.clone())
    }

    pub fn has_action(&self, component: &str, action: &str) -> bool {
        self.components
            .get(component)
            .is_some_and(|r| r.actions.contains(action))
    }

    /// Registered component names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.components.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Invoke `component.action`.
    ///
    /// An unknown component or action is not an error: it is logged and
    /// yields `null`. Errors raised by the action itself are returned as
    /// [`BraidError::Action`].
    pub async fn invoke(&self, component: &str, action: &str, inputs: ActionInputs) -> Result<Value> {
        let Some(registered) = self.components.get(component) else {
            warn!(component, action, "Component not registered, skipping action");
            return Ok(Value::Null);
        };
        if !registered.actions.contains(action) {
            warn!(component, action, "Action not declared by component, skipping");
            return Ok(Value::Null);
        }
        registered
            .component
            .invoke(action, inputs)
            .await
            .map_err(|e| match e {
                BraidError::Action { .. } => e,
                other => BraidError::Action {
                    component: component.to_string(),
                    action: action.to_string(),
                    message: other.to_string(),
                },
            })
    }
}

type ActionFn = Arc<dyn Fn(ActionInputs) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A component assembled from closures.
pub struct FnComponent {
    name: String,
    actions: BTreeMap<String, ActionFn>,
}

impl FnComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: BTreeMap::new(),
        }
    }

    /// Add a synchronous action.
    pub fn action<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionInputs) -> Result<Value> + Send + Sync + 'static,
    {
        self.async_action(name, move |inputs| std::future::ready(f(inputs)))
    }

    /// Add an asynchronous action.
    pub fn async_action<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ActionInputs) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        let action: ActionFn =
            Arc::new(move |inputs| -> BoxFuture<'static, Result<Value>> { Box::pin(f(inputs)) });
        self.actions.insert(name.into(), action);
        self
    }
}

impl Component for FnComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    fn invoke(&self, action: &str, inputs: ActionInputs) -> BoxFuture<'_, Result<Value>> {
        match self.actions.get(action) {
            Some(f) => f(inputs),
            None => {
                let err = BraidError::Action {
                    component: self.name.clone(),
                    action: action.to_string(),
                    message: "no such action".to_string(),
                };
                Box::pin(async move { Err(err) })
            }
        }
    }
}

/// Validated graphs available to `SubGraph` nodes, keyed by graph id.
#[derive(Default)]
pub struct GraphRegistry {
    graphs: RwLock<HashMap<String, Arc<GraphRuntime>>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a graph document.
    pub fn register_graph(&self, graph: LogicGraph) -> Result<Arc<GraphRuntime>> {
        let runtime = Arc::new(GraphRuntime::new(graph)?);
        self.register(runtime.clone());
        Ok(runtime)
    }

    pub fn register(&self, runtime: Arc<GraphRuntime>) {
        let id = runtime.graph_id().to_string();
        debug!(graph_id = %id, "Registered sub-graph");
        self.graphs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, runtime);
    }

    pub fn get(&self, graph_id: &str) -> Option<Arc<GraphRuntime>> {
        self.graphs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(graph_id)
            .cloned()
    }

    pub fn contains(&self, graph_id: &str) -> bool {
        self.get(graph_id).is_some()
    }

    /// Registered graph ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .graphs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}
