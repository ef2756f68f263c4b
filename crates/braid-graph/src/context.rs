use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

use braid_core::config::RuntimeConfig;
use braid_core::event::{BusEvent, EventBus};
use braid_core::rng::SeededRng;
use braid_core::traits::EntityMutation;
use braid_core::value::Value;
use braid_expr::EvalScope;

use crate::bridge::{ComponentRegistry, GraphRegistry};
use crate::graph::VariableScope;

type ScopeMap = Arc<Mutex<HashMap<String, Value>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A pending watch notification produced by a changing `set`.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchNotice {
    pub variable: String,
    pub old_value: Value,
    pub new_value: Value,
}

pub(crate) struct DrainGuard(Arc<AtomicBool>);

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-entity execution state shared by every node of a graph run.
///
/// Cloning is cheap and yields a handle onto the same state. Sub-graphs and
/// watch invocations get derived contexts that swap out selected maps.
#[derive(Clone)]
pub struct GraphContext {
    entity_id: String,
    global: ScopeMap,
    scene: ScopeMap,
    node: ScopeMap,
    local: ScopeMap,
    trigger_event: Arc<Mutex<Option<Arc<BusEvent>>>>,
    components: Arc<ComponentRegistry>,
    entities: Option<Arc<dyn EntityMutation>>,
    subgraphs: Arc<GraphRegistry>,
    rng: Arc<Mutex<SeededRng>>,
    cancel: Arc<Mutex<CancellationToken>>,
    bus: Arc<EventBus>,
    deferred: Arc<Mutex<VecDeque<WatchNotice>>>,
    draining: Arc<AtomicBool>,
    outputs: ScopeMap,
    depth: Arc<AtomicUsize>,
    depth_base: usize,
    nesting: usize,
    config: RuntimeConfig,
}

impl GraphContext {
    pub fn new(entity_id: impl Into<String>, bus: Arc<EventBus>) -> Self {
        let config = RuntimeConfig::default();
        Self {
            entity_id: entity_id.into(),
            global: ScopeMap::default(),
            scene: ScopeMap::default(),
            node: ScopeMap::default(),
            local: ScopeMap::default(),
            trigger_event: Arc::new(Mutex::new(None)),
            components: Arc::new(ComponentRegistry::new()),
            entities: None,
            subgraphs: Arc::new(GraphRegistry::new()),
            rng: Arc::new(Mutex::new(SeededRng::new(config.seed))),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            bus,
            deferred: Arc::new(Mutex::new(VecDeque::new())),
            draining: Arc::new(AtomicBool::new(false)),
            outputs: ScopeMap::default(),
            depth: Arc::new(AtomicUsize::new(0)),
            depth_base: 0,
            nesting: 0,
            config,
        }
    }

    pub fn with_components(mut self, components: Arc<ComponentRegistry>) -> Self {
        self.components = components;
        self
    }

    pub fn with_entities(mut self, entities: Arc<dyn EntityMutation>) -> Self {
        self.entities = Some(entities);
        self
    }

    pub fn with_subgraphs(mut self, subgraphs: Arc<GraphRegistry>) -> Self {
        self.subgraphs = subgraphs;
        self
    }

    pub fn with_rng(mut self, rng: SeededRng) -> Self {
        self.rng = Arc::new(Mutex::new(rng));
        self
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Share `other`'s global and scene maps.
    pub fn with_world_scopes(mut self, other: &GraphContext) -> Self {
        self.global = other.global.clone();
        self.scene = other.scene.clone();
        self
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn entities(&self) -> Option<&Arc<dyn EntityMutation>> {
        self.entities.as_ref()
    }

    pub fn subgraphs(&self) -> &GraphRegistry {
        &self.subgraphs
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// How many sub-graph levels deep this context is.
    pub fn nesting(&self) -> usize {
        self.nesting
    }

    fn scope(&self, scope: VariableScope) -> &ScopeMap {
        match scope {
            VariableScope::Global => &self.global,
            VariableScope::Scene => &self.scene,
            VariableScope::Node => &self.node,
            VariableScope::Local => &self.local,
        }
    }

    pub fn get(&self, scope: VariableScope, name: &str) -> Option<Value> {
        lock(self.scope(scope)).get(name).cloned()
    }

    pub fn contains(&self, scope: VariableScope, name: &str) -> bool {
        lock(self.scope(scope)).contains_key(name)
    }

    /// Write `value`, returning what was there before.
    pub fn set(&self, scope: VariableScope, name: impl Into<String>, value: Value) -> Option<Value> {
        lock(self.scope(scope)).insert(name.into(), value)
    }

    pub fn remove(&self, scope: VariableScope, name: &str) -> Option<Value> {
        lock(self.scope(scope)).remove(name)
    }

    /// Copy of one scope map.
    pub fn snapshot(&self, scope: VariableScope) -> HashMap<String, Value> {
        lock(self.scope(scope)).clone()
    }

    pub fn trigger_event(&self) -> Option<Arc<BusEvent>> {
        lock(&self.trigger_event).clone()
    }

    /// Install `event` as the trigger event, returning the previous one.
    pub fn replace_trigger_event(&self, event: Option<Arc<BusEvent>>) -> Option<Arc<BusEvent>> {
        std::mem::replace(&mut *lock(&self.trigger_event), event)
    }

    /// Uniform draw from the context PRNG.
    pub fn next_random(&self) -> f64 {
        lock(&self.rng).next()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        lock(&self.cancel).clone()
    }

    pub fn cancel(&self) {
        lock(&self.cancel).cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.cancel).is_cancelled()
    }

    /// Replace a tripped cancellation token with a fresh one.
    pub fn reset_cancellation(&self) {
        *lock(&self.cancel) = CancellationToken::new();
    }

    pub fn record_output(&self, node_id: &str, value: Value) {
        lock(&self.outputs).insert(node_id.to_string(), value);
    }

    /// Last value produced by `node_id` in this context.
    pub fn output(&self, node_id: &str) -> Option<Value> {
        lock(&self.outputs).get(node_id).cloned()
    }

    pub fn push_notice(&self, notice: WatchNotice) {
        lock(&self.deferred).push_back(notice);
    }

    pub fn pop_notice(&self) -> Option<WatchNotice> {
        lock(&self.deferred).pop_front()
    }

    pub fn pending_notices(&self) -> usize {
        lock(&self.deferred).len()
    }

    /// Drop every queued notice, returning how many were dropped.
    pub fn clear_notices(&self) -> usize {
        let mut queue = lock(&self.deferred);
        let n = queue.len();
        queue.clear();
        n
    }

    /// Mark entry into a trigger. Returns `true` for the outermost one.
    pub(crate) fn enter(&self) -> bool {
        self.depth.fetch_add(1, Ordering::SeqCst) == 0
    }

    pub(crate) fn exit(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }

    /// Signal dispatches currently in progress on this context, including
    /// those of the parent contexts a sub-graph runs under.
    pub fn trigger_depth(&self) -> usize {
        self.depth_base + self.depth.load(Ordering::SeqCst)
    }

    /// Claim the deferred queue for draining. `None` while another drain on
    /// this context is running; the claim is released when the guard drops.
    pub(crate) fn try_drain(&self) -> Option<DrainGuard> {
        if self.draining.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(DrainGuard(self.draining.clone()))
    }

    /// Same context with an empty local scope.
    pub fn with_fresh_local(&self) -> Self {
        let mut ctx = self.clone();
        ctx.local = ScopeMap::default();
        ctx
    }

    /// Context for a sub-graph run.
    ///
    /// Node and local scopes, outputs and the deferred queue are fresh. The
    /// trigger depth restarts but keeps counting from the parent's. Global and scene scope, the component bridge, the
    /// entity store, the PRNG and the bus are shared. The cancellation flag is
    /// shared unless `isolated`.
    pub fn child(&self, isolated: bool) -> Self {
        let mut ctx = self.clone();
        ctx.node = ScopeMap::default();
        ctx.local = ScopeMap::default();
        ctx.outputs = ScopeMap::default();
        ctx.deferred = Arc::new(Mutex::new(VecDeque::new()));
        ctx.draining = Arc::new(AtomicBool::new(false));
        ctx.depth = Arc::new(AtomicUsize::new(0));
        ctx.depth_base = self.trigger_depth();
        ctx.trigger_event = Arc::new(Mutex::new(None));
        ctx.nesting = self.nesting + 1;
        if isolated {
            ctx.cancel = Arc::new(Mutex::new(CancellationToken::new()));
        }
        ctx
    }
}

impl EvalScope for GraphContext {
    /// Local, node, scene and global scope in that order, then the
    /// `event`, `eventType` and `entityId` specials.
    fn lookup(&self, name: &str) -> Option<Value> {
        for scope in [
            VariableScope::Local,
            VariableScope::Node,
            VariableScope::Scene,
            VariableScope::Global,
        ] {
            if let Some(v) = self.get(scope, name) {
                return Some(v);
            }
        }
        match name {
            "event" => Some(
                self.trigger_event()
                    .map(|e| e.to_value())
                    .unwrap_or(Value::Null),
            ),
            "eventType" => Some(
                self.trigger_event()
                    .map(|e| Value::from(e.event_type.as_str()))
                    .unwrap_or(Value::Null),
            ),
            "entityId" => Some(Value::from(self.entity_id.as_str())),
            _ => None,
        }
    }

    fn random(&self) -> Option<f64> {
        Some(self.next_random())
    }
}

impl std::fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphContext")
            .field("entity_id", &self.entity_id)
            .field("nesting", &self.nesting)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> GraphContext {
        GraphContext::new("hero", Arc::new(EventBus::new()))
    }

    #[test]
    fn test_scopes_are_independent() {
        let ctx = ctx();
        ctx.set(VariableScope::Global, "x", Value::from(1));
        ctx.set(VariableScope::Node, "x", Value::from(2));
        assert_eq!(ctx.get(VariableScope::Global, "x"), Some(Value::from(1)));
        assert_eq!(ctx.get(VariableScope::Node, "x"), Some(Value::from(2)));
        assert_eq!(ctx.get(VariableScope::Local, "x"), None);
    }

    #[test]
    fn test_lookup_order() {
        let ctx = ctx();
        ctx.set(VariableScope::Global, "hp", Value::from(1));
        assert_eq!(ctx.lookup("hp"), Some(Value::from(1)));
        ctx.set(VariableScope::Scene, "hp", Value::from(2));
        assert_eq!(ctx.lookup("hp"), Some(Value::from(2)));
        ctx.set(VariableScope::Node, "hp", Value::from(3));
        assert_eq!(ctx.lookup("hp"), Some(Value::from(3)));
        ctx.set(VariableScope::Local, "hp", Value::from(4));
        assert_eq!(ctx.lookup("hp"), Some(Value::from(4)));
        assert_eq!(ctx.lookup("entityId"), Some(Value::from("hero")));
        assert_eq!(ctx.lookup("eventType"), Some(Value::Null));
        assert_eq!(ctx.lookup("nope"), None);
    }

    #[test]
    fn test_trigger_event_replace_restores() {
        let ctx = ctx();
        let first = Arc::new(BusEvent::new("A", "hero", Value::Null));
        let second = Arc::new(BusEvent::new("B", "hero", Value::Null));
        assert!(ctx.replace_trigger_event(Some(first)).is_none());
        let prev = ctx.replace_trigger_event(Some(second));
        assert_eq!(ctx.lookup("eventType"), Some(Value::from("B")));
        ctx.replace_trigger_event(prev);
        assert_eq!(ctx.lookup("eventType"), Some(Value::from("A")));
    }

    #[test]
    fn test_child_isolates_node_and_local() {
        let parent = ctx();
        parent.set(VariableScope::Global, "g", Value::from(1));
        parent.set(VariableScope::Node, "n", Value::from(2));
        let child = parent.child(false);
        assert_eq!(child.nesting(), 1);
        assert_eq!(child.lookup("g"), Some(Value::from(1)));
        assert_eq!(child.lookup("n"), None);

        child.set(VariableScope::Node, "n", Value::from(9));
        child.set(VariableScope::Global, "g", Value::from(7));
        assert_eq!(parent.get(VariableScope::Node, "n"), Some(Value::from(2)));
        assert_eq!(parent.get(VariableScope::Global, "g"), Some(Value::from(7)));
    }

    #[test]
    fn test_cancellation_sharing() {
        let parent = ctx();
        let shared = parent.child(false);
        let isolated = parent.child(true);
        shared.cancel();
        assert!(parent.is_cancelled());
        assert!(!isolated.is_cancelled());

        parent.reset_cancellation();
        assert!(!parent.is_cancelled());
        assert!(!shared.is_cancelled());
    }

    #[test]
    fn test_random_is_seeded() {
        let a = ctx().with_rng(SeededRng::new(99));
        let b = ctx().with_rng(SeededRng::new(99));
        let xs: Vec<f64> = (0..5).map(|_| a.random().unwrap()).collect();
        let ys: Vec<f64> = (0..5).map(|_| b.random().unwrap()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_depth_tracking() {
        let ctx = ctx();
        assert!(ctx.enter());
        assert!(!ctx.enter());
        ctx.exit();
        ctx.exit();
        assert!(ctx.enter());
        assert_eq!(ctx.trigger_depth(), 1);

        let child = ctx.child(false);
        assert!(child.enter());
        assert_eq!(child.trigger_depth(), 2);
    }

    #[test]
    fn test_drain_claim_is_exclusive() {
        let ctx = ctx();
        let watch_scope = ctx.with_fresh_local();
        let guard = ctx.try_drain().unwrap();
        assert!(watch_scope.try_drain().is_none());
        assert!(ctx.child(false).try_drain().is_some());
        drop(guard);
        assert!(watch_scope.try_drain().is_some());
    }
}
