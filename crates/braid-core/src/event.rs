use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::value::Value;

/// Dispatch phase. Handlers of one event run phase by phase in this order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Before,
    #[default]
    Execute,
    After,
}

impl EventPhase {
    pub const ALL: [EventPhase; 3] = [EventPhase::Before, EventPhase::Execute, EventPhase::After];
}

/// Well-known lifecycle event types.
pub mod types {
    pub const INIT: &str = "Init";
    pub const ERROR: &str = "Error";
    pub const DISPOSE: &str = "Dispose";
    pub const START: &str = "Start";
}

/// Where an event originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    pub id: String,
}

/// An event travelling through the bus.
///
/// Handlers share one `Arc<BusEvent>`, so cancellation and error reports made
/// in an earlier phase are visible to later handlers and to the emitter.
#[derive(Debug)]
pub struct BusEvent {
    pub id: String,
    pub event_type: String,
    pub source: EventSource,
    pub data: Value,
    pub bubbles: bool,
    pub cancelable: bool,
    pub timestamp: DateTime<Utc>,
    cancelled: AtomicBool,
    error: Mutex<Option<String>>,
}

impl BusEvent {
    pub fn new(event_type: impl Into<String>, source_id: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            source: EventSource {
                id: source_id.into(),
            },
            data,
            bubbles: false,
            cancelable: true,
            timestamp: Utc::now(),
            cancelled: AtomicBool::new(false),
            error: Mutex::new(None),
        }
    }

    pub fn bubbling(mut self, bubbles: bool) -> Self {
        self.bubbles = bubbles;
        self
    }

    pub fn cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }

    /// Request cancellation. Ignored for non-cancelable events.
    pub fn cancel(&self) {
        if self.cancelable {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Record an explicit failure for the emitter to inspect.
    pub fn fail(&self, message: impl Into<String>) {
        *self.error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    pub fn error(&self) -> Option<String> {
        self.error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Record view exposed to expressions as `event`.
    pub fn to_value(&self) -> Value {
        Value::record([
            ("type", Value::from(self.event_type.as_str())),
            ("source", Value::from(self.source.id.as_str())),
            ("data", self.data.clone()),
        ])
    }
}

pub type EventHandler = Arc<dyn Fn(Arc<BusEvent>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Options for [`EventBus::on`].
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Scope the handler to a node: it then only sees events sourced at that
    /// node (or bubbling up from its descendants), and is removed by
    /// [`EventBus::off_node`].
    pub node_id: Option<String>,
}

impl SubscribeOptions {
    pub fn node(node_id: impl Into<String>) -> Self {
        Self {
            node_id: Some(node_id.into()),
        }
    }
}

struct HandlerEntry {
    id: u64,
    node_id: Option<String>,
    handler: EventHandler,
}

#[derive(Default)]
struct BusState {
    handlers: HashMap<(String, EventPhase), Vec<HandlerEntry>>,
    parents: HashMap<String, String>,
}

/// Phased publish/subscribe bus with cancellation and hierarchical bubbling.
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a handler for `event_type` in `phase`.
    pub fn on(
        &self,
        event_type: impl Into<String>,
        phase: EventPhase,
        handler: EventHandler,
        opts: SubscribeOptions,
    ) -> Subscription {
        let event_type = event_type.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .handlers
            .entry((event_type.clone(), phase))
            .or_default()
            .push(HandlerEntry {
                id,
                node_id: opts.node_id,
                handler,
            });
        Subscription {
            id,
            key: (event_type, phase),
            state: Arc::downgrade(&self.state),
        }
    }

    /// Remove every handler scoped to `node_id`. Returns how many were removed.
    pub fn off_node(&self, node_id: &str) -> usize {
        let mut state = self.lock();
        let mut removed = 0;
        for list in state.handlers.values_mut() {
            let before = list.len();
            list.retain(|h| h.node_id.as_deref() != Some(node_id));
            removed += before - list.len();
        }
        state.handlers.retain(|_, list| !list.is_empty());
        removed
    }

    /// Declare `parent` as the bubbling target of `child`.
    pub fn set_parent(&self, child: impl Into<String>, parent: impl Into<String>) {
        self.lock().parents.insert(child.into(), parent.into());
    }

    pub fn clear_parent(&self, child: &str) {
        self.lock().parents.remove(child);
    }

    pub fn handler_count(&self) -> usize {
        self.lock().handlers.values().map(|l| l.len()).sum()
    }

    /// Deliver `event` phase by phase.
    ///
    /// Within a phase the order is: handlers scoped to the source node, then
    /// (for bubbling events) handlers scoped to each ancestor nearest-first,
    /// then unscoped handlers. Delivery stops once a cancelable event is cancelled.
    pub async fn emit(&self, event: Arc<BusEvent>) {
        for phase in EventPhase::ALL {
            let targets = self.delivery_list(&event, phase);
            for handler in targets {
                if event.is_cancelled() {
                    debug!(event_type = %event.event_type, "Event cancelled, stopping dispatch");
                    return;
                }
                handler(event.clone()).await;
            }
        }
    }

    fn delivery_list(&self, event: &BusEvent, phase: EventPhase) -> Vec<EventHandler> {
        let state = self.lock();
        let Some(list) = state.handlers.get(&(event.event_type.clone(), phase)) else {
            return Vec::new();
        };

        let mut chain = vec![event.source.id.clone()];
        if event.bubbles {
            let mut current = event.source.id.clone();
            while let Some(parent) = state.parents.get(&current) {
                if chain.contains(parent) {
                    break;
                }
                chain.push(parent.clone());
                current = parent.clone();
            }
        }

        let mut out = Vec::new();
        for node in &chain {
            out.extend(
                list.iter()
                    .filter(|h| h.node_id.as_deref() == Some(node.as_str()))
                    .map(|h| h.handler.clone()),
            );
        }
        out.extend(
            list.iter()
                .filter(|h| h.node_id.is_none())
                .map(|h| h.handler.clone()),
        );
        out
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`EventBus::on`].
pub struct Subscription {
    id: u64,
    key: (String, EventPhase),
    state: Weak<Mutex<BusState>>,
}

impl Subscription {
    /// Remove the handler. Safe to call after the bus is gone.
    pub fn unsubscribe(self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(list) = state.handlers.get_mut(&self.key) {
                list.retain(|h| h.id != self.id);
            }
        }
    }
}

/// Wrap an async closure as an [`EventHandler`].
pub fn handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Arc<BusEvent>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |event| -> BoxFuture<'static, ()> { Box::pin(f(event)) })
}
