use std::collections::BTreeMap;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::value::{Value, Vec2};

/// Resolved inputs handed to an action.
pub type ActionInputs = BTreeMap<String, Value>;

/// A component exposing named actions to graph `Action` nodes.
///
/// The callable surface is declared up front by [`Component::actions`];
/// the registry only dispatches names listed there.
pub trait Component: Send + Sync + 'static {
    /// Component name (matched against an action node's `component`).
    fn name(&self) -> &str;

    /// Static manifest of callable action names.
    fn actions(&self) -> Vec<String>;

    /// Invoke one action with resolved inputs.
    fn invoke(&self, action: &str, inputs: ActionInputs) -> BoxFuture<'_, Result<Value>>;
}

/// Entity state mutations used by the movement built-ins.
///
/// Hosts implement this over whatever owns entity transforms; the runtime
/// never reaches into a global store.
pub trait EntityMutation: Send + Sync + 'static {
    fn get_position(&self, entity_id: &str) -> Option<Vec2>;

    fn set_position(&self, entity_id: &str, position: Vec2);

    fn translate(&self, entity_id: &str, dx: f64, dy: f64) {
        let current = self.get_position(entity_id).unwrap_or_default();
        self.set_position(entity_id, Vec2::new(current.x + dx, current.y + dy));
    }
}
