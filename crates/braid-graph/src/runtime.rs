use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use braid_core::error::{BraidError, Result};
use braid_core::event::{types, BusEvent, EventPhase};
use braid_core::traits::ActionInputs;
use braid_core::value::Value;
use braid_expr::{EvalScope, ExpressionCache};

use crate::builtin::{self, BUILTIN_COMPONENT};
use crate::context::{GraphContext, WatchNotice};
use crate::graph::edge::CONTINUATION_PINS;
use crate::graph::{
    BranchMode, FlowOp, GraphNode, InputValue, JoinMode, LogicGraph, NodeKind, VariableDef,
    VariableOp, VariableScope,
};

/// Sub-graphs nested deeper than this fail instead of recursing further.
pub const MAX_SUBGRAPH_NESTING: usize = 32;

#[derive(Debug)]
struct DataSource {
    pin: String,
    from: String,
    from_pin: String,
}

/// A signal node and the bus phase it listens in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalBinding {
    pub node_id: String,
    pub signal: String,
    pub phase: EventPhase,
}

/// What a node produced and which pins control leaves through.
struct Outcome {
    value: Value,
    pins: Vec<String>,
    continue_default: bool,
}

impl Outcome {
    fn next(value: Value) -> Self {
        Self {
            value,
            pins: Vec::new(),
            continue_default: true,
        }
    }

    /// Follow `pins`, then the default continuation.
    fn then(value: Value, pins: &[&str]) -> Self {
        Self {
            value,
            pins: pins.iter().map(|p| p.to_string()).collect(),
            continue_default: true,
        }
    }

    /// Follow `pins` only.
    fn only(value: Value, pins: Vec<String>) -> Self {
        Self {
            value,
            pins,
            continue_default: false,
        }
    }

    fn halt(value: Value) -> Self {
        Self::only(value, Vec::new())
    }
}

/// Immutable, indexed form of a [`LogicGraph`].
///
/// One runtime can serve any number of contexts; all mutable state lives in
/// the [`GraphContext`] passed to each call.
#[derive(Debug)]
pub struct GraphRuntime {
    graph: LogicGraph,
    node_index: HashMap<String, usize>,
    /// node id → `(from_pin, target)` control edges in document order.
    outgoing: HashMap<String, Vec<(String, String)>>,
    /// node id → data edges feeding its pins.
    incoming: HashMap<String, Vec<DataSource>>,
    signals: HashMap<String, Vec<String>>,
    watches: HashMap<String, Vec<String>>,
    variables: HashMap<String, usize>,
    expressions: ExpressionCache,
}

impl GraphRuntime {
    /// Validate `graph` and build its indices. Every expression in the
    /// document is compiled here.
    pub fn new(graph: LogicGraph) -> Result<Self> {
        graph.check()?;

        let node_index = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        let variables = graph
            .variables
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), i))
            .collect();

        let mut outgoing: HashMap<String, Vec<(String, String)>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<DataSource>> = HashMap::new();
        for edge in &graph.edges {
            if edge.is_data() {
                incoming.entry(edge.to.clone()).or_default().push(DataSource {
                    pin: edge.to_pin.clone(),
                    from: edge.from.clone(),
                    from_pin: edge.from_pin.clone(),
                });
            } else {
                outgoing
                    .entry(edge.from.clone())
                    .or_default()
                    .push((edge.from_pin.clone(), edge.to.clone()));
            }
        }

        let mut signals: HashMap<String, Vec<String>> = HashMap::new();
        let mut watches: HashMap<String, Vec<String>> = HashMap::new();
        let expressions = ExpressionCache::new();
        for node in &graph.nodes {
            match &node.kind {
                NodeKind::Signal { signal, .. } => {
                    signals.entry(signal.clone()).or_default().push(node.id.clone());
                }
                NodeKind::Variable {
                    op: VariableOp::Watch,
                    variable,
                    ..
                } => {
                    watches.entry(variable.clone()).or_default().push(node.id.clone());
                }
                NodeKind::SubGraph { input_mappings, .. } => {
                    for source in input_mappings.values() {
                        expressions.compile(source)?;
                    }
                }
                _ => {}
            }
            for (_, input) in node.static_inputs() {
                if let Some(source) = input.as_expr() {
                    expressions.compile(source)?;
                }
            }
        }
        for var in &graph.variables {
            if let Some(source) = var.default.as_ref().and_then(InputValue::as_expr) {
                expressions.compile(source)?;
            }
        }

        debug!(
            graph_id = %graph.graph_id,
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Graph runtime built"
        );

        Ok(Self {
            graph,
            node_index,
            outgoing,
            incoming,
            signals,
            watches,
            variables,
            expressions,
        })
    }

    pub fn graph(&self) -> &LogicGraph {
        &self.graph
    }

    pub fn graph_id(&self) -> &str {
        &self.graph.graph_id
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.node_index.get(id).map(|&i| &self.graph.nodes[i])
    }

    pub fn variable(&self, name: &str) -> Option<&VariableDef> {
        self.variables.get(name).map(|&i| &self.graph.variables[i])
    }

    /// Signal node ids listening for `signal`, in declaration order.
    pub fn signal_nodes(&self, signal: &str) -> &[String] {
        self.signals.get(signal).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every signal node with the bus phase it binds to.
    pub fn signal_bindings(&self) -> Vec<SignalBinding> {
        self.graph
            .nodes
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Signal { signal, phase } => Some(SignalBinding {
                    node_id: node.id.clone(),
                    signal: signal.clone(),
                    phase: phase.unwrap_or_default(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Compiled expressions held by this runtime.
    pub fn expressions(&self) -> &ExpressionCache {
        &self.expressions
    }

    /// Write declared defaults into `ctx`.
    ///
    /// Node and local variables are always (re)initialised; global and scene
    /// variables only when not already present, since those maps outlive a
    /// single graph.
    pub fn init_variables(&self, ctx: &GraphContext) -> Result<()> {
        for def in &self.graph.variables {
            let value = match &def.default {
                Some(input) => self.resolve(input, ctx)?,
                None => Value::Null,
            };
            match def.scope {
                VariableScope::Node | VariableScope::Local => {
                    ctx.set(def.scope, def.name.clone(), value);
                }
                VariableScope::Global | VariableScope::Scene => {
                    if !ctx.contains(def.scope, &def.name) {
                        ctx.set(def.scope, def.name.clone(), value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Read a variable from its declared scope.
    pub fn read_variable(&self, name: &str, ctx: &GraphContext) -> Result<Value> {
        match self.variable(name) {
            Some(def) => Ok(ctx
                .get(def.scope, name)
                .or_else(|| ctx.lookup(name))
                .unwrap_or_default()),
            None => ctx
                .lookup(name)
                .ok_or_else(|| BraidError::UnknownVariable(name.to_string())),
        }
    }

    /// Write a declared variable and queue watch notices if it changed.
    /// Returns whether the value changed.
    pub fn write_variable(&self, name: &str, value: Value, ctx: &GraphContext) -> Result<bool> {
        let def = self
            .variable(name)
            .ok_or_else(|| BraidError::UnknownVariable(name.to_string()))?;
        let old = ctx.set(def.scope, name, value.clone()).unwrap_or_default();
        if old == value {
            return Ok(false);
        }
        if self.watches.contains_key(name) {
            ctx.push_notice(WatchNotice {
                variable: name.to_string(),
                old_value: old,
                new_value: value,
            });
        }
        Ok(true)
    }

    /// Write a variable from outside a trigger and run any watches it fires.
    pub async fn set_variable(&self, name: &str, value: Value, ctx: &GraphContext) -> Result<()> {
        let outermost = ctx.enter();
        let result = self.write_variable(name, value, ctx);
        if outermost && result.is_ok() {
            self.drain_deferred(ctx).await;
        }
        ctx.exit();
        result.map(|_| ())
    }

    /// Run every signal node bound to `name` with a synthetic event carrying
    /// `data`. Returns how many handlers ran.
    pub fn trigger_signal<'a>(
        &'a self,
        name: &'a str,
        ctx: &'a GraphContext,
        data: Value,
    ) -> BoxFuture<'a, usize> {
        Box::pin(async move {
            let nodes = self.signal_nodes(name).to_vec();
            if nodes.is_empty() {
                debug!(graph_id = %self.graph_id(), signal = name, "No handlers for signal");
                return 0;
            }
            let event = Arc::new(BusEvent::new(name, ctx.entity_id(), data));
            self.dispatch(nodes, ctx, event).await
        })
    }

    /// Run the given signal nodes with `event` installed as the trigger event.
    ///
    /// The previous trigger event is restored afterwards. The deferred watch
    /// queue is drained between handlers and before returning, unless a drain
    /// is already running on this context. Dispatches nested deeper than
    /// `max_trigger_depth` are skipped and return 0.
    pub fn dispatch<'a>(
        &'a self,
        node_ids: Vec<String>,
        ctx: &'a GraphContext,
        event: Arc<BusEvent>,
    ) -> BoxFuture<'a, usize> {
        Box::pin(async move {
            ctx.enter();
            let limit = ctx.config().max_trigger_depth;
            if ctx.trigger_depth() > limit {
                warn!(
                    graph_id = %self.graph_id(),
                    entity_id = %ctx.entity_id(),
                    event_type = %event.event_type,
                    limit,
                    "Signal dispatch exceeds trigger depth limit, skipping"
                );
                ctx.exit();
                return 0;
            }
            let previous = ctx.replace_trigger_event(Some(event));
            for (i, id) in node_ids.iter().enumerate() {
                if i > 0 {
                    self.drain_deferred(ctx).await;
                }
                if let Err(e) = self.execute_from_node(id, ctx).await {
                    debug!(graph_id = %self.graph_id(), node_id = %id, error = %e, "Signal handler aborted");
                }
            }
            ctx.replace_trigger_event(previous);
            self.drain_deferred(ctx).await;
            ctx.exit();
            node_ids.len()
        })
    }

    /// Run queued watch notifications, up to the per-tick limit.
    /// Returns how many notices were processed.
    ///
    /// Only one drain runs per context at a time. A drain requested while one
    /// is in progress (from a watch handler that suspends, say) returns 0 and
    /// leaves its notices to the running one.
    pub fn drain_deferred<'a>(&'a self, ctx: &'a GraphContext) -> BoxFuture<'a, usize> {
        Box::pin(async move {
            let Some(_claim) = ctx.try_drain() else {
                return 0;
            };
            let limit = ctx.config().max_deferred_per_tick;
            let mut processed = 0;
            while let Some(notice) = ctx.pop_notice() {
                if processed >= limit {
                    let dropped = ctx.clear_notices() + 1;
                    warn!(
                        graph_id = %self.graph_id(),
                        limit,
                        dropped,
                        "Deferred watch queue exceeded per-tick limit, dropping notifications"
                    );
                    break;
                }
                processed += 1;
                let Some(watchers) = self.watches.get(&notice.variable) else {
                    continue;
                };
                for watch_id in watchers {
                    let scope = ctx.with_fresh_local();
                    scope.set(VariableScope::Local, "oldValue", notice.old_value.clone());
                    scope.set(VariableScope::Local, "newValue", notice.new_value.clone());
                    if let Err(e) = self.execute_from_node(watch_id, &scope).await {
                        debug!(node_id = %watch_id, error = %e, "Watch handler aborted");
                    }
                }
            }
            processed
        })
    }

    /// Execute `node_id`, then follow control edges depth-first.
    ///
    /// Returns the value produced by `node_id` itself. Failures of later nodes
    /// are reported on the bus and do not surface here.
    pub fn execute_from_node<'a>(
        &'a self,
        node_id: &'a str,
        ctx: &'a GraphContext,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let mut stack = vec![node_id.to_string()];
            let mut first = true;
            let mut result = Value::Null;

            while let Some(id) = stack.pop() {
                if ctx.is_cancelled() {
                    debug!(graph_id = %self.graph_id(), node_id = %id, "Context cancelled, halting");
                    break;
                }
                let Some(node) = self.node(&id) else {
                    if first {
                        return Err(BraidError::UnknownNode(id));
                    }
                    continue;
                };

                debug!(
                    graph_id = %self.graph_id(),
                    node_id = %id,
                    node_type = node.kind.type_name(),
                    "Executing graph node"
                );

                let outcome = match self.execute_node(node, ctx).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        self.report_failure(&id, &e, ctx).await;
                        if first {
                            return Err(e);
                        }
                        continue;
                    }
                };

                ctx.record_output(&id, outcome.value.clone());
                if first {
                    result = outcome.value.clone();
                    first = false;
                }

                if outcome.continue_default {
                    let pin = self.continuation_pin(&id);
                    stack.extend(self.targets(&id, pin).into_iter().rev().map(String::from));
                }
                for pin in outcome.pins.iter().rev() {
                    stack.extend(self.targets(&id, pin).into_iter().rev().map(String::from));
                }
            }

            Ok(result)
        })
    }

    fn targets(&self, node_id: &str, pin: &str) -> Vec<&str> {
        self.outgoing
            .get(node_id)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(p, _)| p == pin)
                    .map(|(_, to)| to.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `flow` when the node has edges on it, else `out`.
    fn continuation_pin(&self, node_id: &str) -> &'static str {
        CONTINUATION_PINS
            .iter()
            .copied()
            .find(|pin| !self.targets(node_id, pin).is_empty())
            .unwrap_or("out")
    }

    /// Run everything hanging off `node_id.pin`, in edge order.
    async fn follow(&self, node_id: &str, pin: &str, ctx: &GraphContext) {
        for target in self.targets(node_id, pin) {
            if let Err(e) = self.execute_from_node(target, ctx).await {
                debug!(node_id = %target, error = %e, "Branch aborted");
            }
        }
    }

    async fn report_failure(&self, node_id: &str, error: &BraidError, ctx: &GraphContext) {
        warn!(
            graph_id = %self.graph_id(),
            entity_id = %ctx.entity_id(),
            node_id,
            error = %error,
            "Graph node failed"
        );
        let data = Value::record([
            ("graphId", Value::from(self.graph_id())),
            ("nodeId", Value::from(node_id)),
            ("message", Value::from(error.to_string())),
        ]);
        let event = BusEvent::new(types::ERROR, ctx.entity_id(), data).bubbling(true);
        ctx.bus().emit(Arc::new(event)).await;
    }

    fn resolve(&self, input: &InputValue, ctx: &GraphContext) -> Result<Value> {
        match input {
            InputValue::Literal(v) => Ok(v.clone()),
            InputValue::Expr { expr } => self.expressions.eval_source(expr, ctx),
        }
    }

    fn data_source(&self, node_id: &str, pin: &str) -> Option<&DataSource> {
        self.incoming.get(node_id)?.iter().find(|s| s.pin == pin)
    }

    /// A static input if declared, else the value on the matching data edge.
    async fn input(
        &self,
        node_id: &str,
        pin: &str,
        declared: Option<&InputValue>,
        ctx: &GraphContext,
    ) -> Result<Option<Value>> {
        if let Some(input) = declared {
            return self.resolve(input, ctx).map(Some);
        }
        match self.data_source(node_id, pin) {
            Some(source) => self.pull(source, ctx).await.map(Some),
            None => Ok(None),
        }
    }

    async fn pull(&self, source: &DataSource, ctx: &GraphContext) -> Result<Value> {
        let node = self
            .node(&source.from)
            .ok_or_else(|| BraidError::UnknownNode(source.from.clone()))?;
        match &node.kind {
            NodeKind::Variable {
                op: VariableOp::Get,
                variable,
                ..
            } => self.read_variable(variable, ctx),
            NodeKind::Signal { .. } => {
                let data = ctx
                    .trigger_event()
                    .map(|e| e.data.clone())
                    .unwrap_or_default();
                if source.from_pin == "data" {
                    Ok(data)
                } else {
                    Ok(data.get(&source.from_pin).cloned().unwrap_or_default())
                }
            }
            _ => {
                let value = match ctx.output(&node.id) {
                    Some(v) => v,
                    None => {
                        debug!(node_id = %node.id, "Evaluating data source detached");
                        self.execute_node(node, ctx).await?.value
                    }
                };
                Ok(match value {
                    Value::Record(mut fields) if fields.contains_key(&source.from_pin) => fields
                        .remove(&source.from_pin)
                        .unwrap_or_default(),
                    other => other,
                })
            }
        }
    }

    fn execute_node<'a>(
        &'a self,
        node: &'a GraphNode,
        ctx: &'a GraphContext,
    ) -> BoxFuture<'a, Result<Outcome>> {
        Box::pin(async move {
            match &node.kind {
                NodeKind::Signal { .. } => Ok(Outcome::next(
                    ctx.trigger_event()
                        .map(|e| e.data.clone())
                        .unwrap_or_default(),
                )),
                NodeKind::Action {
                    component,
                    action,
                    inputs,
                } => {
                    self.run_action(node, component.as_deref(), action, inputs, ctx)
                        .await
                }
                NodeKind::Branch {
                    mode,
                    condition,
                    value,
                    cases,
                } => match mode {
                    BranchMode::If => {
                        let cond = self
                            .input(&node.id, "condition", condition.as_ref(), ctx)
                            .await?
                            .unwrap_or_default()
                            .is_truthy();
                        let pin = if cond { "true" } else { "false" };
                        Ok(Outcome::only(Value::Bool(cond), vec![pin.to_string()]))
                    }
                    BranchMode::Switch => {
                        let key = self
                            .input(&node.id, "value", value.as_ref(), ctx)
                            .await?
                            .unwrap_or_default()
                            .to_string();
                        let pin = if cases.contains(&key) {
                            key.clone()
                        } else {
                            "default".to_string()
                        };
                        Ok(Outcome::only(Value::String(key), vec![pin]))
                    }
                },
                NodeKind::Flow { op, .. } => self.run_flow(node, *op, ctx).await,
                NodeKind::Variable {
                    op,
                    variable,
                    value,
                } => match op {
                    VariableOp::Get => Ok(Outcome::next(self.read_variable(variable, ctx)?)),
                    VariableOp::Set => {
                        let new_value = self
                            .input(&node.id, "value", value.as_ref(), ctx)
                            .await?
                            .unwrap_or_default();
                        self.write_variable(variable, new_value.clone(), ctx)?;
                        Ok(Outcome::next(new_value))
                    }
                    VariableOp::Watch => Ok(Outcome::next(
                        ctx.get(VariableScope::Local, "newValue").unwrap_or_default(),
                    )),
                },
                NodeKind::SubGraph {
                    graph,
                    input_mappings,
                    output_mappings,
                    isolated,
                } => {
                    self.run_subgraph(graph, input_mappings, output_mappings, *isolated, ctx)
                        .await
                }
            }
        })
    }

    async fn run_action(
        &self,
        node: &GraphNode,
        component: Option<&str>,
        action: &str,
        inputs: &BTreeMap<String, InputValue>,
        ctx: &GraphContext,
    ) -> Result<Outcome> {
        let mut resolved = ActionInputs::new();
        for (name, input) in inputs {
            resolved.insert(name.clone(), self.resolve(input, ctx)?);
        }
        if let Some(sources) = self.incoming.get(&node.id) {
            for source in sources {
                let value = self.pull(source, ctx).await?;
                resolved.insert(source.pin.clone(), value);
            }
        }

        let result = match component {
            None | Some(BUILTIN_COMPONENT) => builtin::invoke(self, action, resolved, ctx).await,
            Some(name) => ctx.components().invoke(name, action, resolved).await,
        };

        match result {
            Ok(Value::Bool(true)) => Ok(Outcome::then(Value::Bool(true), &["success", "complete"])),
            Ok(Value::Bool(false)) => Ok(Outcome::then(Value::Bool(false), &["error", "failed"])),
            Ok(value) => Ok(Outcome::next(value)),
            Err(e) => {
                self.report_failure(&node.id, &e, ctx).await;
                Ok(Outcome::only(Value::Null, vec!["error".to_string()]))
            }
        }
    }

    async fn run_flow(&self, node: &GraphNode, op: FlowOp, ctx: &GraphContext) -> Result<Outcome> {
        let NodeKind::Flow {
            duration,
            branches,
            join_mode,
            items,
            item_var,
            ..
        } = &node.kind
        else {
            return Err(BraidError::eval(format!("node '{}' is not a flow node", node.id)));
        };

        match op {
            FlowOp::Delay => {
                let ms = self
                    .input(&node.id, "duration", duration.as_ref(), ctx)
                    .await?
                    .unwrap_or_default();
                let ms = ms.as_f64().ok_or_else(|| {
                    BraidError::eval(format!("delay duration must be a number, got {}", ms.type_name()))
                })?;
                // Watches queued earlier in this chain run now, not after the wait.
                self.drain_deferred(ctx).await;
                tokio::time::sleep(Duration::from_millis(ms.max(0.0) as u64)).await;
                Ok(Outcome::next(Value::Null))
            }
            FlowOp::Parallel => {
                let pins = if branches.is_empty() {
                    self.branch_pins(&node.id)
                } else {
                    branches.clone()
                };
                let runs = pins.iter().map(|pin| self.follow(&node.id, pin, ctx));
                match join_mode {
                    JoinMode::All => {
                        join_all(runs).await;
                        Ok(Outcome::then(Value::Null, &["complete"]))
                    }
                    JoinMode::Any => {
                        let mut pending: FuturesUnordered<_> = runs.collect();
                        pending.next().await;
                        let continuation = async {
                            self.follow(&node.id, "complete", ctx).await;
                            self.follow(&node.id, self.continuation_pin(&node.id), ctx)
                                .await;
                        };
                        let rest = async { while pending.next().await.is_some() {} };
                        futures::join!(continuation, rest);
                        // Continuation already ran after the first branch; this
                        // node itself resolves only once every branch is done.
                        Ok(Outcome::halt(Value::Null))
                    }
                }
            }
            FlowOp::Merge | FlowOp::Sequence => Ok(Outcome::next(Value::Null)),
            FlowOp::ForEach => {
                let list = match self
                    .input(&node.id, "items", items.as_ref(), ctx)
                    .await?
                    .unwrap_or_default()
                {
                    Value::Array(list) => list,
                    other => {
                        return Err(BraidError::eval(format!(
                            "forEach expects an array, got {}",
                            other.type_name()
                        )))
                    }
                };
                let var = item_var.as_deref().unwrap_or("item");
                let index_var = format!("{}Index", var);
                let limit = ctx.config().max_loop_iterations;
                if list.len() > limit {
                    warn!(node_id = %node.id, len = list.len(), limit, "forEach truncated to iteration limit");
                }

                let mut count = 0usize;
                for (i, item) in list.into_iter().take(limit).enumerate() {
                    if ctx.is_cancelled() {
                        break;
                    }
                    ctx.set(VariableScope::Local, var, item);
                    ctx.set(VariableScope::Local, index_var.as_str(), Value::from(i));
                    self.follow(&node.id, "body", ctx).await;
                    count += 1;
                }
                ctx.remove(VariableScope::Local, var);
                ctx.remove(VariableScope::Local, &index_var);
                Ok(Outcome::then(Value::from(count), &["complete"]))
            }
            FlowOp::Cancel => {
                debug!(graph_id = %self.graph_id(), node_id = %node.id, "Cancelling context");
                ctx.cancel();
                Ok(Outcome::halt(Value::Null))
            }
        }
    }

    /// Outgoing pins of a `parallel` node other than its continuations.
    fn branch_pins(&self, node_id: &str) -> Vec<String> {
        let mut pins: Vec<String> = Vec::new();
        for (pin, _) in self.outgoing.get(node_id).into_iter().flatten() {
            let reserved = CONTINUATION_PINS.contains(&pin.as_str()) || pin == "complete";
            if !reserved && !pins.contains(pin) {
                pins.push(pin.clone());
            }
        }
        pins
    }

    async fn run_subgraph(
        &self,
        graph_id: &str,
        input_mappings: &BTreeMap<String, String>,
        output_mappings: &BTreeMap<String, String>,
        isolated: bool,
        ctx: &GraphContext,
    ) -> Result<Outcome> {
        if ctx.nesting() >= MAX_SUBGRAPH_NESTING {
            return Err(BraidError::eval(format!(
                "sub-graph '{}' exceeds nesting limit of {}",
                graph_id, MAX_SUBGRAPH_NESTING
            )));
        }
        let child_runtime = ctx
            .subgraphs()
            .get(graph_id)
            .ok_or_else(|| BraidError::UnknownGraph(graph_id.to_string()))?;

        let child = ctx.child(isolated);
        child_runtime.init_variables(&child)?;
        for (child_var, source) in input_mappings {
            let value = self.expressions.eval_source(source, ctx)?;
            child.set(VariableScope::Node, child_var.clone(), value);
        }

        child_runtime.trigger_signal(types::START, &child, Value::Null).await;
        child_runtime.trigger_signal(types::INIT, &child, Value::Null).await;

        let mut outputs = BTreeMap::new();
        for (child_var, parent_var) in output_mappings {
            let value = child_runtime.read_variable(child_var, &child).unwrap_or_default();
            self.write_variable(parent_var, value.clone(), ctx)?;
            outputs.insert(child_var.clone(), value);
        }
        Ok(Outcome::next(Value::Record(outputs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use braid_core::event::{handler, EventBus, SubscribeOptions};

    use crate::bridge::{ComponentRegistry, FnComponent, GraphRegistry};
    use crate::graph::{GraphEdge, VariableDef};

    fn ctx() -> GraphContext {
        GraphContext::new("e1", Arc::new(EventBus::new()))
    }

    fn var(name: &str, default: impl Into<Value>) -> VariableDef {
        VariableDef::new(name, VariableScope::Node).with_default(default.into())
    }

    fn set(id: &str, variable: &str, expr: &str) -> GraphNode {
        GraphNode::variable(id, VariableOp::Set, variable, Some(InputValue::expr(expr)))
    }

    #[tokio::test]
    async fn test_branch_if_follows_one_side() {
        for (flag, expected) in [(true, "yes"), (false, "no")] {
            let mut g = LogicGraph::new("branch");
            g.variables.push(var("flag", flag));
            g.variables.push(var("path", ""));
            g.nodes.push(GraphNode::signal("start", "Go"));
            g.nodes.push(GraphNode::branch_if("check", InputValue::expr("flag")));
            g.nodes.push(set("yes", "path", "path + 'yes'"));
            g.nodes.push(set("no", "path", "path + 'no'"));
            g.edges.push(GraphEdge::flow("start", "check"));
            g.edges.push(GraphEdge::pin("check", "true", "yes"));
            g.edges.push(GraphEdge::pin("check", "false", "no"));

            let rt = GraphRuntime::new(g).unwrap();
            let ctx = ctx();
            rt.init_variables(&ctx).unwrap();
            assert_eq!(rt.trigger_signal("Go", &ctx, Value::Null).await, 1);
            assert_eq!(rt.read_variable("path", &ctx).unwrap(), Value::from(expected));
        }
    }

    #[tokio::test]
    async fn test_switch_default_pin() {
        let mut g = LogicGraph::new("switch");
        g.variables.push(var("state", "sleeping"));
        g.variables.push(var("hit", ""));
        g.nodes.push(GraphNode::signal("start", "Go"));
        g.nodes.push(GraphNode::switch("sw", InputValue::expr("state"), &["idle", "attack"]));
        g.nodes.push(set("idle", "hit", "'idle'"));
        g.nodes.push(set("fallback", "hit", "'default'"));
        g.edges.push(GraphEdge::flow("start", "sw"));
        g.edges.push(GraphEdge::pin("sw", "idle", "idle"));
        g.edges.push(GraphEdge::pin("sw", "default", "fallback"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("hit", &ctx).unwrap(), Value::from("default"));

        rt.set_variable("state", Value::from("idle"), &ctx).await.unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("hit", &ctx).unwrap(), Value::from("idle"));
    }

    #[tokio::test]
    async fn test_for_each_sums_and_cleans_up() {
        let mut g = LogicGraph::new("loop");
        g.variables.push(var("sum", 0));
        g.nodes.push(GraphNode::signal("start", "Go"));
        let mut each = GraphNode::flow("each", FlowOp::ForEach);
        if let NodeKind::Flow { items, .. } = &mut each.kind {
            *items = Some(InputValue::literal(vec![1, 2, 3]));
        }
        g.nodes.push(each);
        g.nodes.push(set("add", "sum", "sum + item"));
        g.edges.push(GraphEdge::flow("start", "each"));
        g.edges.push(GraphEdge::pin("each", "body", "add"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("sum", &ctx).unwrap(), Value::from(6));
        assert!(ctx.get(VariableScope::Local, "item").is_none());
        assert!(ctx.get(VariableScope::Local, "itemIndex").is_none());
    }

    #[tokio::test]
    async fn test_watch_fires_only_on_change() {
        let mut g = LogicGraph::new("watch");
        g.variables.push(var("x", 0));
        g.variables.push(var("fired", 0));
        g.variables.push(var("last", Value::Null));
        g.nodes.push(GraphNode::variable("w", VariableOp::Watch, "x", None));
        g.nodes.push(set("count", "fired", "fired + 1"));
        g.nodes.push(set("remember", "last", "oldValue + '->' + newValue"));
        g.edges.push(GraphEdge::flow("w", "count"));
        g.edges.push(GraphEdge::flow("count", "remember"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.set_variable("x", Value::from(5), &ctx).await.unwrap();
        rt.set_variable("x", Value::from(5), &ctx).await.unwrap();
        assert_eq!(rt.read_variable("fired", &ctx).unwrap(), Value::from(1));
        assert_eq!(rt.read_variable("last", &ctx).unwrap(), Value::from("0->5"));
        assert!(ctx.get(VariableScope::Local, "newValue").is_none());
    }

    #[tokio::test]
    async fn test_watch_is_deferred_until_trigger_ends() {
        let mut g = LogicGraph::new("deferred");
        g.variables.push(var("x", 0));
        g.variables.push(var("log", ""));
        g.nodes.push(GraphNode::signal("start", "Go"));
        g.nodes.push(set("setx", "x", "1"));
        g.nodes.push(set("after", "log", "log + 'after;'"));
        g.nodes.push(GraphNode::variable("w", VariableOp::Watch, "x", None));
        g.nodes.push(set("watched", "log", "log + 'watch;'"));
        g.edges.push(GraphEdge::flow("start", "setx"));
        g.edges.push(GraphEdge::flow("setx", "after"));
        g.edges.push(GraphEdge::flow("w", "watched"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("log", &ctx).unwrap(), Value::from("after;watch;"));
        assert_eq!(ctx.pending_notices(), 0);
    }

    #[tokio::test]
    async fn test_self_triggering_watch_is_bounded() {
        let mut g = LogicGraph::new("runaway");
        g.variables.push(var("x", 0));
        g.nodes.push(GraphNode::variable("w", VariableOp::Watch, "x", None));
        g.nodes.push(set("bump", "x", "x + 1"));
        g.edges.push(GraphEdge::flow("w", "bump"));

        let rt = GraphRuntime::new(g).unwrap();
        let mut config = braid_core::config::RuntimeConfig::default();
        config.max_deferred_per_tick = 10;
        let ctx = ctx().with_config(config);
        rt.init_variables(&ctx).unwrap();
        rt.set_variable("x", Value::from(1), &ctx).await.unwrap();
        assert_eq!(rt.read_variable("x", &ctx).unwrap(), Value::from(11));
        assert_eq!(ctx.pending_notices(), 0);
    }

    fn action_graph(action: &str) -> LogicGraph {
        let mut g = LogicGraph::new("actions");
        g.variables.push(var("trail", ""));
        g.nodes.push(GraphNode::signal("start", "Go"));
        g.nodes.push(GraphNode::action("act", Some("gadget"), action, []));
        for pin in ["success", "complete", "error", "failed", "out"] {
            g.nodes.push(set(pin, "trail", &format!("trail + '{};'", pin)));
            g.edges.push(GraphEdge::pin("act", pin, pin));
        }
        g.edges.push(GraphEdge::flow("start", "act"));
        g
    }

    fn gadget_ctx() -> GraphContext {
        let mut components = ComponentRegistry::new();
        components.register(
            FnComponent::new("gadget")
                .action("yes", |_| Ok(Value::Bool(true)))
                .action("no", |_| Ok(Value::Bool(false)))
                .action("number", |_| Ok(Value::from(3)))
                .action("boom", |_| Err(BraidError::eval("kaput"))),
        );
        ctx().with_components(Arc::new(components))
    }

    #[tokio::test]
    async fn test_action_result_pins() {
        for (action, expected) in [
            ("yes", "success;complete;out;"),
            ("no", "error;failed;out;"),
            ("number", "out;"),
            ("boom", "error;"),
            ("missing", "out;"),
        ] {
            let rt = GraphRuntime::new(action_graph(action)).unwrap();
            let ctx = gadget_ctx();
            rt.init_variables(&ctx).unwrap();
            rt.trigger_signal("Go", &ctx, Value::Null).await;
            assert_eq!(
                rt.read_variable("trail", &ctx).unwrap(),
                Value::from(expected),
                "action {action}"
            );
        }
    }

    #[tokio::test]
    async fn test_failures_emit_error_events() {
        let rt = GraphRuntime::new(action_graph("boom")).unwrap();
        let ctx = gadget_ctx();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        ctx.bus().on(
            types::ERROR,
            EventPhase::Execute,
            handler(move |event| {
                let sink = sink.clone();
                async move {
                    let node = event.data.get("nodeId").cloned().unwrap_or_default();
                    sink.lock().unwrap().push(node.to_string());
                }
            }),
            SubscribeOptions::node("e1"),
        );
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(*seen.lock().unwrap(), vec!["act".to_string()]);
    }

    #[tokio::test]
    async fn test_eval_error_aborts_only_that_node() {
        let mut g = LogicGraph::new("eval");
        g.variables.push(var("a", 0));
        g.variables.push(var("b", 0));
        g.nodes.push(GraphNode::signal("start", "Go"));
        g.nodes.push(set("bad", "a", "ghost + 1"));
        g.nodes.push(set("after_bad", "a", "99"));
        g.nodes.push(set("good", "b", "1"));
        g.edges.push(GraphEdge::flow("start", "bad"));
        g.edges.push(GraphEdge::flow("bad", "after_bad"));
        g.edges.push(GraphEdge::flow("start", "good"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("a", &ctx).unwrap(), Value::from(0));
        assert_eq!(rt.read_variable("b", &ctx).unwrap(), Value::from(1));
    }

    #[tokio::test]
    async fn test_flow_edges_run_in_declaration_order() {
        let mut g = LogicGraph::new("order");
        g.variables.push(var("trail", ""));
        g.nodes.push(GraphNode::signal("start", "Go"));
        for id in ["a", "b", "c"] {
            g.nodes.push(set(id, "trail", &format!("trail + '{}'", id)));
        }
        g.nodes.push(set("a2", "trail", "trail + 'A'"));
        g.edges.push(GraphEdge::flow("start", "a"));
        g.edges.push(GraphEdge::flow("start", "b"));
        g.edges.push(GraphEdge::flow("start", "c"));
        g.edges.push(GraphEdge::flow("a", "a2"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("trail", &ctx).unwrap(), Value::from("aAbc"));
    }

    #[tokio::test]
    async fn test_cancel_halts_remaining_nodes() {
        let mut g = LogicGraph::new("cancel");
        g.variables.push(var("trail", ""));
        g.nodes.push(GraphNode::signal("start", "Go"));
        g.nodes.push(set("a", "trail", "trail + 'a'"));
        g.nodes.push(GraphNode::flow("stop", FlowOp::Cancel));
        g.nodes.push(set("b", "trail", "trail + 'b'"));
        g.edges.push(GraphEdge::flow("start", "a"));
        g.edges.push(GraphEdge::flow("start", "stop"));
        g.edges.push(GraphEdge::flow("start", "b"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("trail", &ctx).unwrap(), Value::from("a"));
        assert!(ctx.is_cancelled());

        ctx.reset_cancellation();
        rt.execute_from_node("b", &ctx).await.unwrap();
        assert_eq!(rt.read_variable("trail", &ctx).unwrap(), Value::from("ab"));
    }

    #[tokio::test]
    async fn test_data_edges_pull_values() {
        let mut g = LogicGraph::new("data");
        g.variables.push(var("hp", 40));
        g.variables.push(var("copy", 0));
        g.variables.push(var("from_event", Value::Null));
        g.nodes.push(GraphNode::signal("start", "Hit"));
        g.nodes.push(GraphNode::variable("read", VariableOp::Get, "hp", None));
        g.nodes.push(GraphNode::variable("write", VariableOp::Set, "copy", None));
        g.nodes.push(GraphNode::variable("store", VariableOp::Set, "from_event", None));
        g.edges.push(GraphEdge::flow("start", "write"));
        g.edges.push(GraphEdge::flow("write", "store"));
        g.edges.push(GraphEdge::data("read", "value", "write", "value"));
        g.edges.push(GraphEdge::data("start", "amount", "store", "value"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        let data = Value::record([("amount", Value::from(12))]);
        rt.trigger_signal("Hit", &ctx, data).await;
        assert_eq!(rt.read_variable("copy", &ctx).unwrap(), Value::from(40));
        assert_eq!(rt.read_variable("from_event", &ctx).unwrap(), Value::from(12));
    }

    #[tokio::test]
    async fn test_event_is_visible_and_restored() {
        let mut g = LogicGraph::new("event");
        g.variables.push(var("kind", ""));
        g.variables.push(var("amount", 0));
        g.nodes.push(GraphNode::signal("start", "Hit"));
        g.nodes.push(set("k", "kind", "eventType"));
        g.nodes.push(set("a", "amount", "event.data.amount"));
        g.edges.push(GraphEdge::flow("start", "k"));
        g.edges.push(GraphEdge::flow("k", "a"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Hit", &ctx, Value::record([("amount", Value::from(3))]))
            .await;
        assert_eq!(rt.read_variable("kind", &ctx).unwrap(), Value::from("Hit"));
        assert_eq!(rt.read_variable("amount", &ctx).unwrap(), Value::from(3));
        assert!(ctx.trigger_event().is_none());
    }

    #[tokio::test]
    async fn test_emit_signal_reenters_graph() {
        let mut g = LogicGraph::new("emit");
        g.variables.push(var("trail", ""));
        g.nodes.push(GraphNode::signal("start", "First"));
        g.nodes.push(GraphNode::action(
            "emit",
            None,
            "emit-signal",
            [("signal", InputValue::literal("Second"))],
        ));
        g.nodes.push(set("tail", "trail", "trail + eventType + ';'"));
        g.nodes.push(GraphNode::signal("second", "Second"));
        g.nodes.push(set("inner", "trail", "trail + eventType + ';'"));
        g.edges.push(GraphEdge::flow("start", "emit"));
        g.edges.push(GraphEdge::flow("emit", "tail"));
        g.edges.push(GraphEdge::flow("second", "inner"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("First", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("trail", &ctx).unwrap(), Value::from("Second;First;"));
    }

    #[tokio::test]
    async fn test_subgraph_isolation_and_outputs() {
        let mut child = LogicGraph::new("child");
        child.variables.push(var("input", 0));
        child.variables.push(var("secret", 0));
        child.variables.push(var("result", 0));
        child.nodes.push(GraphNode::signal("init", "Init"));
        child.nodes.push(set("s", "secret", "123"));
        child.nodes.push(set("r", "result", "input * 2"));
        child.edges.push(GraphEdge::flow("init", "s"));
        child.edges.push(GraphEdge::flow("s", "r"));

        let registry = Arc::new(GraphRegistry::new());
        registry.register_graph(child).unwrap();

        let mut parent = LogicGraph::new("parent");
        parent.variables.push(var("base", 21));
        parent.variables.push(var("doubled", 0));
        parent.nodes.push(GraphNode::signal("start", "Go"));
        parent.nodes.push(GraphNode::new(
            "sub",
            NodeKind::SubGraph {
                graph: "child".into(),
                input_mappings: [("input".to_string(), "base".to_string())].into(),
                output_mappings: [("result".to_string(), "doubled".to_string())].into(),
                isolated: false,
            },
        ));
        parent.edges.push(GraphEdge::flow("start", "sub"));

        let rt = GraphRuntime::new(parent).unwrap();
        let ctx = ctx().with_subgraphs(registry);
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;

        assert_eq!(rt.read_variable("doubled", &ctx).unwrap(), Value::from(42));
        assert!(ctx.get(VariableScope::Node, "secret").is_none());
        assert!(ctx.get(VariableScope::Node, "result").is_none());
    }

    #[tokio::test]
    async fn test_missing_subgraph_is_node_local() {
        let mut g = LogicGraph::new("parent");
        g.variables.push(var("after", false));
        g.nodes.push(GraphNode::signal("start", "Go"));
        g.nodes.push(GraphNode::new(
            "sub",
            NodeKind::SubGraph {
                graph: "nowhere".into(),
                input_mappings: BTreeMap::new(),
                output_mappings: BTreeMap::new(),
                isolated: true,
            },
        ));
        g.nodes.push(set("sibling", "after", "true"));
        g.edges.push(GraphEdge::flow("start", "sub"));
        g.edges.push(GraphEdge::flow("start", "sibling"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(rt.read_variable("after", &ctx).unwrap(), Value::Bool(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_waits() {
        let mut g = LogicGraph::new("delay");
        g.variables.push(var("done", false));
        g.nodes.push(GraphNode::signal("start", "Go"));
        let mut wait = GraphNode::flow("wait", FlowOp::Delay);
        if let NodeKind::Flow { duration, .. } = &mut wait.kind {
            *duration = Some(InputValue::literal(250));
        }
        g.nodes.push(wait);
        g.nodes.push(set("finish", "done", "true"));
        g.edges.push(GraphEdge::flow("start", "wait"));
        g.edges.push(GraphEdge::flow("wait", "finish"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        let started = tokio::time::Instant::now();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(rt.read_variable("done", &ctx).unwrap(), Value::Bool(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_runs_while_chain_waits() {
        let mut g = LogicGraph::new("slow-chain");
        g.variables.push(var("x", 0));
        g.variables.push(var("seen", false));
        g.nodes.push(GraphNode::signal("start", "Go"));
        g.nodes.push(set("setx", "x", "1"));
        let mut wait = GraphNode::flow("wait", FlowOp::Delay);
        if let NodeKind::Flow { duration, .. } = &mut wait.kind {
            *duration = Some(InputValue::literal(10_000));
        }
        g.nodes.push(wait);
        g.nodes.push(GraphNode::variable("w", VariableOp::Watch, "x", None));
        g.nodes.push(set("mark", "seen", "true"));
        g.edges.push(GraphEdge::flow("start", "setx"));
        g.edges.push(GraphEdge::flow("setx", "wait"));
        g.edges.push(GraphEdge::flow("w", "mark"));

        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        let midway = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            (rt.read_variable("seen", &ctx).unwrap(), ctx.pending_notices())
        };
        let (_, (seen, pending)) =
            tokio::join!(rt.trigger_signal("Go", &ctx, Value::Null), midway);
        assert_eq!(seen, Value::Bool(true));
        assert_eq!(pending, 0);
    }

    #[tokio::test]
    async fn test_emit_signal_fails_past_trigger_depth() {
        let mut g = LogicGraph::new("echo");
        g.variables.push(var("count", 0));
        g.nodes.push(GraphNode::signal("start", "Loop"));
        g.nodes.push(set("bump", "count", "count + 1"));
        g.nodes.push(GraphNode::action(
            "again",
            None,
            "emit-signal",
            [("signal", InputValue::literal("Loop"))],
        ));
        g.nodes.push(set("tripped", "count", "count * 100"));
        g.edges.push(GraphEdge::flow("start", "bump"));
        g.edges.push(GraphEdge::flow("bump", "again"));
        g.edges.push(GraphEdge::pin("again", "error", "tripped"));

        let rt = GraphRuntime::new(g).unwrap();
        let mut config = braid_core::config::RuntimeConfig::default();
        config.max_trigger_depth = 3;
        let ctx = ctx().with_config(config);
        rt.init_variables(&ctx).unwrap();
        assert_eq!(rt.trigger_signal("Loop", &ctx, Value::Null).await, 1);
        assert_eq!(rt.read_variable("count", &ctx).unwrap(), Value::from(300));
        assert_eq!(ctx.trigger_depth(), 0);
    }

    fn parallel_graph(join: JoinMode) -> LogicGraph {
        let mut g = LogicGraph::new("parallel");
        g.variables.push(var("trail", ""));
        g.nodes.push(GraphNode::signal("start", "Go"));
        let mut par = GraphNode::flow("par", FlowOp::Parallel);
        if let NodeKind::Flow { branches, join_mode, .. } = &mut par.kind {
            *branches = vec!["slow".into(), "fast".into()];
            *join_mode = join;
        }
        g.nodes.push(par);
        for (id, ms) in [("slow", 100), ("fast", 10)] {
            let mut wait = GraphNode::flow(format!("wait_{id}"), FlowOp::Delay);
            if let NodeKind::Flow { duration, .. } = &mut wait.kind {
                *duration = Some(InputValue::literal(ms));
            }
            g.nodes.push(wait);
            g.nodes.push(set(id, "trail", &format!("trail + '{};'", id)));
            g.edges.push(GraphEdge::pin("par", id, format!("wait_{id}")));
            g.edges.push(GraphEdge::flow(format!("wait_{id}"), id));
        }
        g.nodes.push(set("joined", "trail", "trail + 'joined;'"));
        g.edges.push(GraphEdge::flow("start", "par"));
        g.edges.push(GraphEdge::pin("par", "complete", "joined"));
        g
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_all_joins_after_every_branch() {
        let rt = GraphRuntime::new(parallel_graph(JoinMode::All)).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(
            rt.read_variable("trail", &ctx).unwrap(),
            Value::from("fast;slow;joined;")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_any_continues_after_first_branch() {
        let rt = GraphRuntime::new(parallel_graph(JoinMode::Any)).unwrap();
        let ctx = ctx();
        rt.init_variables(&ctx).unwrap();
        rt.trigger_signal("Go", &ctx, Value::Null).await;
        assert_eq!(
            rt.read_variable("trail", &ctx).unwrap(),
            Value::from("fast;joined;slow;")
        );

        let started = tokio::time::Instant::now();
        rt.execute_from_node("par", &ctx).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_global_defaults_do_not_overwrite() {
        let mut g = LogicGraph::new("globals");
        g.variables
            .push(VariableDef::new("score", VariableScope::Global).with_default(Value::from(0)));
        let rt = GraphRuntime::new(g).unwrap();
        let ctx = ctx();
        ctx.set(VariableScope::Global, "score", Value::from(10));
        rt.init_variables(&ctx).unwrap();
        assert_eq!(rt.read_variable("score", &ctx).unwrap(), Value::from(10));
    }

    #[test]
    fn test_invalid_graph_rejected() {
        let mut g = LogicGraph::new("bad");
        g.edges.push(GraphEdge::flow("a", "b"));
        assert!(matches!(
            GraphRuntime::new(g).unwrap_err(),
            BraidError::GraphLoad { .. }
        ));
    }

    #[test]
    fn test_signal_bindings() {
        let mut g = LogicGraph::new("bindings");
        g.nodes.push(GraphNode::signal("a", "Hit"));
        g.nodes.push(GraphNode::new(
            "b",
            NodeKind::Signal {
                signal: "Hit".into(),
                phase: Some(EventPhase::After),
            },
        ));
        let rt = GraphRuntime::new(g).unwrap();
        assert_eq!(rt.signal_nodes("Hit"), ["a".to_string(), "b".to_string()]);
        let bindings = rt.signal_bindings();
        assert_eq!(bindings[0].phase, EventPhase::Execute);
        assert_eq!(bindings[1].phase, EventPhase::After);
    }
}
