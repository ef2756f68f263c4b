use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use braid_core::config::RuntimeConfig;
use braid_core::error::{BraidError, Result};
use braid_core::event::{handler, EventBus, SubscribeOptions, Subscription};
use braid_core::rng::SeedSequence;
use braid_core::traits::EntityMutation;
use braid_core::value::Value;

use crate::bridge::{ComponentRegistry, GraphRegistry};
use crate::context::GraphContext;
use crate::graph::LogicGraph;
use crate::runtime::GraphRuntime;

struct LoadedGraph {
    runtime: Arc<GraphRuntime>,
    context: GraphContext,
    subscriptions: Vec<Subscription>,
}

/// Runs one graph per entity.
///
/// Each loaded entity gets its own [`GraphContext`], so node and local
/// variables never leak between entities. Global and scene scope are shared
/// by every entity of one executor. Signal nodes are bound to the event bus
/// and scoped to the owning entity.
pub struct GraphExecutor {
    bus: Arc<EventBus>,
    components: Arc<ComponentRegistry>,
    entities: Option<Arc<dyn EntityMutation>>,
    subgraphs: Arc<GraphRegistry>,
    seeds: Arc<SeedSequence>,
    config: RuntimeConfig,
    world: GraphContext,
    loaded: Mutex<HashMap<String, LoadedGraph>>,
}

impl GraphExecutor {
    pub fn new(bus: Arc<EventBus>) -> Self {
        let config = RuntimeConfig::default();
        Self {
            world: GraphContext::new("", bus.clone()),
            bus,
            components: Arc::new(ComponentRegistry::new()),
            entities: None,
            subgraphs: Arc::new(GraphRegistry::new()),
            seeds: Arc::new(SeedSequence::new(config.seed)),
            config,
            loaded: Mutex::new(HashMap::new()),
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

    /// Seed source for per-entity PRNGs. Share it with a lifecycle manager to
    /// reproduce a whole run from one base seed.
    pub fn with_seeds(mut self, seeds: Arc<SeedSequence>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Runtime limits. Also resets the seed sequence to `config.seed`.
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.seeds = Arc::new(SeedSequence::new(config.seed));
        self.config = config;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subgraphs(&self) -> &Arc<GraphRegistry> {
        &self.subgraphs
    }

    fn loaded(&self) -> MutexGuard<'_, HashMap<String, LoadedGraph>> {
        self.loaded.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate `graph` and load it for `entity_id`.
    pub fn load_graph(&self, entity_id: &str, graph: LogicGraph) -> Result<Arc<GraphRuntime>> {
        let runtime = Arc::new(GraphRuntime::new(graph)?);
        self.load_runtime(entity_id, runtime.clone())?;
        Ok(runtime)
    }

    /// Load an already validated runtime for `entity_id`, replacing whatever
    /// the entity had loaded before.
    pub fn load_runtime(&self, entity_id: &str, runtime: Arc<GraphRuntime>) -> Result<()> {
        self.unload_graph(entity_id);

        let mut context = GraphContext::new(entity_id, self.bus.clone())
            .with_world_scopes(&self.world)
            .with_components(self.components.clone())
            .with_subgraphs(self.subgraphs.clone())
            .with_rng(self.seeds.next_rng())
            .with_config(self.config.clone());
        if let Some(entities) = &self.entities {
            context = context.with_entities(entities.clone());
        }
        runtime.init_variables(&context)?;

        // Signals hear events sourced at this entity or bubbling up from its
        // descendants. World-level events are fanned out via `trigger_signal`.
        let mut subscriptions = Vec::new();
        for binding in runtime.signal_bindings() {
            let rt = runtime.clone();
            let ctx = context.clone();
            let node_id = binding.node_id.clone();
            let sub = self.bus.on(
                binding.signal.as_str(),
                binding.phase,
                handler(move |event| {
                    let rt = rt.clone();
                    let ctx = ctx.clone();
                    let node_id = node_id.clone();
                    async move {
                        rt.dispatch(vec![node_id], &ctx, event).await;
                    }
                }),
                SubscribeOptions::node(entity_id),
            );
            subscriptions.push(sub);
        }

        info!(
            entity_id,
            graph_id = %runtime.graph_id(),
            signals = subscriptions.len(),
            "Loaded graph"
        );
        self.loaded().insert(
            entity_id.to_string(),
            LoadedGraph {
                runtime,
                context,
                subscriptions,
            },
        );
        Ok(())
    }

    /// Remove the entity's bus bindings, cancel its in-flight work and drop
    /// its context. Returns `false` if nothing was loaded.
    pub fn unload_graph(&self, entity_id: &str) -> bool {
        let Some(entry) = self.loaded().remove(entity_id) else {
            return false;
        };
        for sub in entry.subscriptions {
            sub.unsubscribe();
        }
        entry.context.cancel();
        info!(entity_id, graph_id = %entry.runtime.graph_id(), "Unloaded graph");
        true
    }

    fn entry(&self, entity_id: &str) -> Result<(Arc<GraphRuntime>, GraphContext)> {
        self.loaded()
            .get(entity_id)
            .map(|e| (e.runtime.clone(), e.context.clone()))
            .ok_or_else(|| BraidError::UnknownEntity(entity_id.to_string()))
    }

    /// Run the entity's handlers for `signal` directly, bypassing the bus.
    /// Returns how many handlers ran.
    pub async fn trigger_signal(&self, entity_id: &str, signal: &str, data: Value) -> Result<usize> {
        let (runtime, context) = self.entry(entity_id)?;
        debug!(entity_id, signal, "Triggering signal");
        Ok(runtime.trigger_signal(signal, &context, data).await)
    }

    pub async fn set_variable(&self, entity_id: &str, name: &str, value: Value) -> Result<()> {
        let (runtime, context) = self.entry(entity_id)?;
        runtime.set_variable(name, value, &context).await
    }

    pub fn get_variable(&self, entity_id: &str, name: &str) -> Result<Value> {
        let (runtime, context) = self.entry(entity_id)?;
        runtime.read_variable(name, &context)
    }

    /// Loaded entity ids, sorted.
    pub fn loaded_entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.loaded().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_loaded(&self, entity_id: &str) -> bool {
        self.loaded().contains_key(entity_id)
    }

    /// Clear a tripped `cancel` so later triggers run again.
    pub fn reset_cancellation(&self, entity_id: &str) -> Result<()> {
        let (_, context) = self.entry(entity_id)?;
        context.reset_cancellation();
        Ok(())
    }

    /// Run any watch notifications still queued for the entity.
    pub async fn drain(&self, entity_id: &str) -> Result<usize> {
        let (runtime, context) = self.entry(entity_id)?;
        Ok(runtime.drain_deferred(&context).await)
    }

    /// Handle onto the entity's context, for inspection.
    pub fn context(&self, entity_id: &str) -> Option<GraphContext> {
        self.loaded().get(entity_id).map(|e| e.context.clone())
    }

    pub fn runtime(&self, entity_id: &str) -> Option<Arc<GraphRuntime>> {
        self.loaded().get(entity_id).map(|e| e.runtime.clone())
    }
}
