use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use braid_core::config::{FallbackState, LifecycleConfig};
use braid_core::error::{BraidError, Result};
use braid_core::event::{types, BusEvent, EventBus};
use braid_core::rng::{SeedSequence, SeededRng};
use braid_core::value::Value;

use crate::backoff::BackoffExt;
use crate::state::{DisposeReason, LifecycleState, NodeLifecycleInfo};

/// What a construction script receives.
#[derive(Debug, Clone)]
pub struct ConstructionArgs {
    pub node_id: String,
    /// Fresh generator seeded from the manager's seed sequence.
    pub rng: SeededRng,
    pub spawn_params: Value,
}

pub type ConstructionScript =
    Arc<dyn Fn(ConstructionArgs) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`ConstructionScript`].
pub fn construction_script<F, Fut>(f: F) -> ConstructionScript
where
    F: Fn(ConstructionArgs) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |args| -> BoxFuture<'static, Result<()>> { Box::pin(f(args)) })
}

/// Options for [`LifecycleManager::initialize`].
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Initialize children, in registration order, once this node is ready.
    pub recursive: bool,
    pub spawn_params: Value,
    /// Selects the construction script. Falls back to the type recorded at
    /// the previous attempt.
    pub node_type: Option<String>,
}

impl InitOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_spawn_params(mut self, params: Value) -> Self {
        self.spawn_params = params;
        self
    }
}

#[derive(Default)]
struct Hierarchy {
    nodes: HashMap<String, NodeLifecycleInfo>,
    children: HashMap<String, Vec<String>>,
    /// Registration order.
    order: Vec<String>,
}

/// Drives nodes through `uninitialized → constructing → pending → ready`,
/// retrying failures per their [`LifecycleConfig`] and tearing hierarchies
/// down children first.
pub struct LifecycleManager {
    bus: Arc<EventBus>,
    seeds: Arc<SeedSequence>,
    defaults: LifecycleConfig,
    hierarchy: Mutex<Hierarchy>,
    scripts: Mutex<HashMap<String, ConstructionScript>>,
}

impl LifecycleManager {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            seeds: Arc::new(SeedSequence::new(braid_core::config::DEFAULT_SEED)),
            defaults: LifecycleConfig::default(),
            hierarchy: Mutex::new(Hierarchy::default()),
            scripts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_seeds(mut self, seeds: Arc<SeedSequence>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Config used by nodes registered without one.
    pub fn with_defaults(mut self, defaults: LifecycleConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    fn hierarchy(&self) -> MutexGuard<'_, Hierarchy> {
        self.hierarchy.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `node_id` under `parent`. The parent link is mirrored into the
    /// bus so bubbling events reach ancestors.
    pub fn register(
        &self,
        node_id: &str,
        parent: Option<&str>,
        config: Option<LifecycleConfig>,
    ) -> Result<()> {
        let mut h = self.hierarchy();
        if h.nodes.contains_key(node_id) {
            return Err(BraidError::lifecycle(node_id, "already registered"));
        }
        if let Some(parent) = parent {
            if !h.nodes.contains_key(parent) {
                return Err(BraidError::lifecycle(
                    node_id,
                    format!("parent '{}' is not registered", parent),
                ));
            }
            h.children
                .entry(parent.to_string())
                .or_default()
                .push(node_id.to_string());
            self.bus.set_parent(node_id, parent);
        }
        let config = config.unwrap_or_else(|| self.defaults.clone());
        h.nodes.insert(
            node_id.to_string(),
            NodeLifecycleInfo::new(config, parent.map(str::to_string)),
        );
        h.order.push(node_id.to_string());
        debug!(node_id, parent = ?parent, "Registered lifecycle node");
        Ok(())
    }

    pub fn register_construction_script(&self, node_type: &str, script: ConstructionScript) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(node_type.to_string(), script);
    }

    pub fn state(&self, node_id: &str) -> Option<LifecycleState> {
        self.hierarchy().nodes.get(node_id).map(|n| n.state)
    }

    pub fn info(&self, node_id: &str) -> Option<NodeLifecycleInfo> {
        self.hierarchy().nodes.get(node_id).cloned()
    }

    /// Children of `node_id` in registration order.
    pub fn children(&self, node_id: &str) -> Vec<String> {
        self.hierarchy()
            .children
            .get(node_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn parent(&self, node_id: &str) -> Option<String> {
        self.hierarchy()
            .nodes
            .get(node_id)
            .and_then(|n| n.parent.clone())
    }

    pub fn is_ready(&self, node_id: &str) -> bool {
        self.state(node_id) == Some(LifecycleState::Ready)
    }

    /// Parentless nodes in registration order.
    pub fn roots(&self) -> Vec<String> {
        let h = self.hierarchy();
        h.order
            .iter()
            .filter(|id| h.nodes.get(*id).is_some_and(|n| n.parent.is_none()))
            .cloned()
            .collect()
    }

    /// Move `node_id` to `next` if the state machine allows it.
    pub fn transition(&self, node_id: &str, next: LifecycleState) -> bool {
        let mut h = self.hierarchy();
        let Some(node) = h.nodes.get_mut(node_id) else {
            warn!(node_id, to = %next, "Transition on unknown node");
            return false;
        };
        if !node.state.can_transition_to(next) {
            warn!(node_id, from = %node.state, to = %next, "Rejected lifecycle transition");
            return false;
        }
        debug!(node_id, from = %node.state, to = %next, "Lifecycle transition");
        node.state = next;
        true
    }

    fn update<R>(&self, node_id: &str, f: impl FnOnce(&mut NodeLifecycleInfo) -> R) -> Option<R> {
        self.hierarchy().nodes.get_mut(node_id).map(f)
    }

    /// Initialize `node_id`, retrying per its config.
    ///
    /// Returns whether the node is ready afterwards. Nodes already past
    /// `uninitialized`/`error` are left alone. Fails if the parent is not
    /// ready or if retries are exhausted with fallback `error` or `dispose`.
    pub fn initialize<'a>(
        &'a self,
        node_id: &'a str,
        opts: InitOptions,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let state = self
                .state(node_id)
                .ok_or_else(|| BraidError::UnknownNode(node_id.to_string()))?;
            if !state.can_initialize() {
                return Ok(state == LifecycleState::Ready);
            }
            if let Some(parent) = self.parent(node_id) {
                if !self.is_ready(&parent) {
                    return Err(BraidError::lifecycle(
                        node_id,
                        format!("parent '{}' is not ready", parent),
                    ));
                }
            }
            if let Some(node_type) = &opts.node_type {
                self.update(node_id, |n| n.node_type = Some(node_type.clone()));
            }
            if state == LifecycleState::Error {
                self.transition(node_id, LifecycleState::Uninitialized);
            }

            loop {
                let message = match self.attempt(node_id, &opts).await {
                    Ok(()) => break,
                    Err(message) => message,
                };
                if self.state(node_id) == Some(LifecycleState::Disposed) {
                    return Ok(false);
                }

                if self.state(node_id) != Some(LifecycleState::Error) {
                    self.transition(node_id, LifecycleState::Error);
                }
                let Some((retry_count, config)) = self.update(node_id, |n| {
                    n.retry_count += 1;
                    n.error = Some(message.clone());
                    (n.retry_count, n.config.clone())
                }) else {
                    return Err(BraidError::UnknownNode(node_id.to_string()));
                };
                self.emit_error(node_id, &message, retry_count, &config).await;

                if retry_count <= config.retry_count {
                    let delay = config
                        .retry_backoff
                        .delay(config.retry_delay_ms, retry_count);
                    warn!(
                        node_id,
                        attempt = retry_count,
                        max_retries = config.retry_count,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Retrying node initialization"
                    );
                    if !self.wait_and_reset(node_id, delay).await {
                        return Ok(false);
                    }
                    continue;
                }

                match config.fallback_state {
                    FallbackState::Error => {
                        error!(node_id, retries = retry_count - 1, error = %message, "Node initialization failed");
                        return Err(BraidError::lifecycle(node_id, message));
                    }
                    FallbackState::Dispose => {
                        error!(node_id, error = %message, "Node initialization failed, disposing");
                        self.dispose(node_id, DisposeReason::InitFailed).await?;
                        return Err(BraidError::lifecycle(node_id, message));
                    }
                    FallbackState::Retry => {
                        warn!(
                            node_id,
                            error = %message,
                            "Retry budget exhausted, fallback 'retry' restarts it; initialization repeats until it succeeds"
                        );
                        self.update(node_id, |n| n.retry_count = 0);
                        let delay = Duration::from_millis(config.retry_delay_ms);
                        if !self.wait_and_reset(node_id, delay).await {
                            return Ok(false);
                        }
                    }
                }
            }

            self.update(node_id, |n| {
                n.retry_count = 0;
                n.error = None;
            });
            info!(node_id, "Node ready");

            if opts.recursive {
                for child in self.children(node_id) {
                    if let Err(e) = self.initialize(&child, InitOptions::recursive()).await {
                        warn!(node_id = %child, error = %e, "Child initialization failed");
                    }
                }
            }
            Ok(true)
        })
    }

    /// Sleep, then move the node back to `uninitialized`. Returns `false` if
    /// it was disposed in the meantime.
    async fn wait_and_reset(&self, node_id: &str, delay: Duration) -> bool {
        tokio::time::sleep(delay).await;
        if self.state(node_id) == Some(LifecycleState::Disposed) {
            return false;
        }
        self.transition(node_id, LifecycleState::Uninitialized)
    }

    /// One construct + init pass. Leaves the node `ready` on success.
    async fn attempt(&self, node_id: &str, opts: &InitOptions) -> std::result::Result<(), String> {
        if !self.transition(node_id, LifecycleState::Constructing) {
            return Err(format!(
                "cannot construct from state '{}'",
                self.state(node_id).unwrap_or_default()
            ));
        }
        let started = tokio::time::Instant::now();
        let (config, node_type) = self
            .update(node_id, |n| {
                n.init_start_time = Some(started);
                (n.config.clone(), n.node_type.clone())
            })
            .ok_or_else(|| format!("node '{}' is not registered", node_id))?;
        // Construction and the Init emit share one budget from `started`.
        let deadline = started + Duration::from_millis(config.init_timeout_ms);
        let timed_out = || format!("initialization timed out after {}ms", config.init_timeout_ms);

        let script = node_type.as_deref().and_then(|t| {
            self.scripts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(t)
                .cloned()
        });
        if let Some(script) = script {
            let args = ConstructionArgs {
                node_id: node_id.to_string(),
                rng: self.seeds.next_rng(),
                spawn_params: opts.spawn_params.clone(),
            };
            tokio::time::timeout_at(deadline, script(args))
                .await
                .map_err(|_| timed_out())?
                .map_err(|e| format!("construction failed: {}", e))?;
        }

        if !self.transition(node_id, LifecycleState::Pending) {
            return Err("node left the constructing state".to_string());
        }

        let data = Value::record([
            ("nodeId", Value::from(node_id)),
            ("spawnParams", opts.spawn_params.clone()),
        ]);
        let event = Arc::new(BusEvent::new(types::INIT, node_id, data));
        tokio::time::timeout_at(deadline, self.bus.emit(event.clone()))
            .await
            .map_err(|_| timed_out())?;
        if event.is_cancelled() {
            return Err("initialization cancelled".to_string());
        }
        if let Some(message) = event.error() {
            return Err(message);
        }

        if !self.transition(node_id, LifecycleState::Ready) {
            return Err("node left the pending state".to_string());
        }
        Ok(())
    }

    async fn emit_error(&self, node_id: &str, message: &str, retry_count: u32, config: &LifecycleConfig) {
        let data = Value::record([
            ("nodeId", Value::from(node_id)),
            ("message", Value::from(message)),
            ("retryCount", Value::from(retry_count as usize)),
        ]);
        let event = BusEvent::new(types::ERROR, node_id, data).bubbling(!config.error_boundary);
        self.bus.emit(Arc::new(event)).await;
    }

    /// Dispose `node_id` and its subtree, children first.
    pub fn dispose<'a>(
        &'a self,
        node_id: &'a str,
        reason: DisposeReason,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let state = self
                .state(node_id)
                .ok_or_else(|| BraidError::UnknownNode(node_id.to_string()))?;
            if state == LifecycleState::Disposed {
                return Ok(());
            }

            for child in self.children(node_id) {
                self.dispose(&child, DisposeReason::Parent).await?;
            }

            let data = Value::record([
                ("nodeId", Value::from(node_id)),
                ("reason", Value::from(reason.as_str())),
            ]);
            self.bus
                .emit(Arc::new(BusEvent::new(types::DISPOSE, node_id, data)))
                .await;

            self.transition(node_id, LifecycleState::Disposed);
            let removed = self.bus.off_node(node_id);
            info!(node_id, reason = %reason, handlers_removed = removed, "Node disposed");
            Ok(())
        })
    }

    /// Initialize every root recursively. Returns how many roots became ready.
    pub async fn initialize_all(&self) -> usize {
        let mut ready = 0;
        for root in self.roots() {
            match self.initialize(&root, InitOptions::recursive()).await {
                Ok(true) => ready += 1,
                Ok(false) => {}
                Err(e) => warn!(node_id = %root, error = %e, "Root initialization failed"),
            }
        }
        ready
    }

    /// Dispose every root and its subtree.
    pub async fn dispose_all(&self, reason: DisposeReason) -> Result<()> {
        for root in self.roots() {
            self.dispose(&root, reason).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use braid_core::config::Backoff;
    use braid_core::event::{handler, EventPhase, SubscribeOptions};

    fn manager() -> LifecycleManager {
        LifecycleManager::new(Arc::new(EventBus::new()))
    }

    fn config(retries: u32, fallback: FallbackState) -> LifecycleConfig {
        LifecycleConfig {
            retry_count: retries,
            retry_delay_ms: 100,
            retry_backoff: Backoff::Exponential,
            fallback_state: fallback,
            ..LifecycleConfig::default()
        }
    }

    fn fail_init(m: &LifecycleManager, node: &str) {
        m.bus().on(
            types::INIT,
            EventPhase::Execute,
            handler(|event| async move { event.fail("not today") }),
            SubscribeOptions::node(node),
        );
    }

    #[tokio::test]
    async fn test_initialize_reaches_ready() {
        let m = manager();
        m.register("root", None, None).unwrap();
        assert_eq!(m.state("root"), Some(LifecycleState::Uninitialized));
        assert!(m.initialize("root", InitOptions::default()).await.unwrap());
        assert!(m.is_ready("root"));
        assert!(m.info("root").unwrap().init_start_time.is_some());
    }

    #[tokio::test]
    async fn test_initialize_is_noop_when_ready() {
        let m = manager();
        m.register("root", None, None).unwrap();
        m.initialize("root", InitOptions::default()).await.unwrap();
        assert!(m.initialize("root", InitOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_parent_must_be_ready() {
        let m = manager();
        m.register("root", None, None).unwrap();
        m.register("child", Some("root"), None).unwrap();
        let err = m.initialize("child", InitOptions::default()).await.unwrap_err();
        assert!(matches!(err, BraidError::Lifecycle { .. }));
        assert_eq!(m.state("child"), Some(LifecycleState::Uninitialized));
    }

    #[test]
    fn test_register_rejects_unknown_parent_and_duplicates() {
        let m = manager();
        assert!(m.register("child", Some("ghost"), None).is_err());
        m.register("root", None, None).unwrap();
        assert!(m.register("root", None, None).is_err());
    }

    #[test]
    fn test_transition_rejects_disallowed() {
        let m = manager();
        m.register("n", None, None).unwrap();
        assert!(!m.transition("n", LifecycleState::Ready));
        assert!(m.transition("n", LifecycleState::Constructing));
        assert!(!m.transition("missing", LifecycleState::Constructing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_exponential_backoff_then_errors() {
        let m = manager();
        m.register("n", None, Some(config(2, FallbackState::Error))).unwrap();
        fail_init(&m, "n");

        let started = tokio::time::Instant::now();
        let err = m.initialize("n", InitOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("not today"));
        assert_eq!(started.elapsed(), Duration::from_millis(100 + 200));

        let info = m.info("n").unwrap();
        assert_eq!(info.state, LifecycleState::Error);
        assert_eq!(info.retry_count, 3);
        assert_eq!(info.error.as_deref(), Some("not today"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let m = manager();
        m.register("n", None, Some(config(3, FallbackState::Error))).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        m.bus().on(
            types::INIT,
            EventPhase::Execute,
            handler(move |event| {
                let seen = seen.clone();
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                        event.fail("warming up");
                    }
                }
            }),
            SubscribeOptions::node("n"),
        );
        assert!(m.initialize("n", InitOptions::default()).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(m.info("n").unwrap().retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_timeout_counts_as_failure() {
        let m = manager();
        let cfg = LifecycleConfig {
            init_timeout_ms: 50,
            ..config(0, FallbackState::Error)
        };
        m.register("slow", None, Some(cfg)).unwrap();
        m.bus().on(
            types::INIT,
            EventPhase::Execute,
            handler(|_| async { tokio::time::sleep(Duration::from_secs(10)).await }),
            SubscribeOptions::node("slow"),
        );
        let err = m.initialize("slow", InitOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_construction_counts_against_init_timeout() {
        let m = manager();
        let cfg = LifecycleConfig {
            init_timeout_ms: 50,
            ..config(0, FallbackState::Error)
        };
        m.register_construction_script(
            "heavy",
            construction_script(|_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            }),
        );
        m.register("n", None, Some(cfg)).unwrap();
        let started = tokio::time::Instant::now();
        let err = m
            .initialize("n", InitOptions::default().with_node_type("heavy"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(m.state("n"), Some(LifecycleState::Error));
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_timeout_covers_construction_and_init_together() {
        let m = manager();
        let cfg = LifecycleConfig {
            init_timeout_ms: 100,
            ..config(0, FallbackState::Error)
        };
        m.register_construction_script(
            "warmup",
            construction_script(|_| async {
                tokio::time::sleep(Duration::from_millis(70)).await;
                Ok(())
            }),
        );
        m.register("n", None, Some(cfg)).unwrap();
        m.bus().on(
            types::INIT,
            EventPhase::Execute,
            handler(|_| async { tokio::time::sleep(Duration::from_millis(70)).await }),
            SubscribeOptions::node("n"),
        );
        let err = m
            .initialize("n", InitOptions::default().with_node_type("warmup"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_init_counts_as_failure() {
        let m = manager();
        m.register("n", None, Some(config(0, FallbackState::Error))).unwrap();
        m.bus().on(
            types::INIT,
            EventPhase::Before,
            handler(|event| async move { event.cancel() }),
            SubscribeOptions::node("n"),
        );
        let err = m.initialize("n", InitOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_fallback() {
        let m = manager();
        m.register("n", None, Some(config(1, FallbackState::Dispose))).unwrap();
        fail_init(&m, "n");
        assert!(m.initialize("n", InitOptions::default()).await.is_err());
        assert_eq!(m.state("n"), Some(LifecycleState::Disposed));
        assert_eq!(m.bus().handler_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_fallback_resets_budget() {
        let m = manager();
        m.register("n", None, Some(config(1, FallbackState::Retry))).unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();
        m.bus().on(
            types::INIT,
            EventPhase::Execute,
            handler(move |event| {
                let seen = seen.clone();
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) < 5 {
                        event.fail("again");
                    }
                }
            }),
            SubscribeOptions::node("n"),
        );
        assert!(m.initialize("n", InitOptions::default()).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_construction_script_gets_seeded_rng_and_params() {
        let seeds = Arc::new(SeedSequence::new(7));
        let m = manager().with_seeds(seeds.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        m.register_construction_script(
            "spawner",
            construction_script(move |mut args: ConstructionArgs| {
                let sink = sink.clone();
                async move {
                    let roll = args.rng.next_u64();
                    sink.lock().unwrap().push((args.node_id, roll, args.spawn_params));
                    Ok(())
                }
            }),
        );
        m.register("a", None, None).unwrap();
        let opts = InitOptions::default()
            .with_node_type("spawner")
            .with_spawn_params(Value::from(3));
        m.initialize("a", opts).await.unwrap();

        let expected = SeedSequence::new(7).next_rng().next_u64();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], ("a".to_string(), expected, Value::from(3)));
        assert_eq!(seeds.issued(), 1);
    }

    #[tokio::test]
    async fn test_failing_construction_script() {
        let m = manager();
        m.register_construction_script(
            "broken",
            construction_script(|_| async { Err(BraidError::eval("bad prefab")) }),
        );
        m.register("n", None, Some(config(0, FallbackState::Error))).unwrap();
        let err = m
            .initialize("n", InitOptions::default().with_node_type("broken"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bad prefab"));
        assert_eq!(m.state("n"), Some(LifecycleState::Error));
    }

    #[tokio::test]
    async fn test_dispose_is_terminal() {
        let m = manager();
        m.register("n", None, None).unwrap();
        m.dispose("n", DisposeReason::Explicit).await.unwrap();
        assert_eq!(m.state("n"), Some(LifecycleState::Disposed));
        assert!(!m.initialize("n", InitOptions::default()).await.unwrap());
        assert!(!m.transition("n", LifecycleState::Uninitialized));
        m.dispose("n", DisposeReason::Explicit).await.unwrap();
    }
}
