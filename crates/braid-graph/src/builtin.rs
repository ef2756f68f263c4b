//! Actions available to `Action` nodes that name no component.

use tracing::{info, warn};

use braid_core::error::{BraidError, Result};
use braid_core::traits::ActionInputs;
use braid_core::value::{Value, Vec2};

use crate::context::GraphContext;
use crate::runtime::GraphRuntime;

/// Component name that routes to this table explicitly.
pub const BUILTIN_COMPONENT: &str = "builtin";

pub const ACTIONS: &[&str] = &["log", "string", "emit-signal", "translate", "move-entity"];

pub(crate) async fn invoke(
    runtime: &GraphRuntime,
    action: &str,
    inputs: ActionInputs,
    ctx: &GraphContext,
) -> Result<Value> {
    match action {
        "log" => {
            let message = inputs.get("message").cloned().unwrap_or_default();
            info!(
                graph_id = %runtime.graph_id(),
                entity_id = %ctx.entity_id(),
                "{}",
                message
            );
            Ok(Value::Null)
        }
        "string" => Ok(Value::String(render(&inputs))),
        "emit-signal" => {
            let signal = inputs
                .get("signal")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| failure(action, "missing 'signal' input"))?
                .to_string();
            let limit = ctx.config().max_trigger_depth;
            if ctx.trigger_depth() >= limit {
                return Err(failure(
                    action,
                    &format!("signal '{}' re-entered more than {} levels deep", signal, limit),
                ));
            }
            let data = inputs.get("data").cloned().unwrap_or_default();
            let handled = runtime.trigger_signal(&signal, ctx, data).await;
            Ok(Value::from(handled))
        }
        "translate" => {
            let store = ctx
                .entities()
                .ok_or_else(|| failure(action, "no entity store attached"))?;
            let target = target_entity(&inputs, ctx);
            let dx = number_or_zero(&inputs, "dx", action)?;
            let dy = number_or_zero(&inputs, "dy", action)?;
            store.translate(&target, dx, dy);
            Ok(store
                .get_position(&target)
                .map(Value::Vec2)
                .unwrap_or_default())
        }
        "move-entity" => {
            let store = ctx
                .entities()
                .ok_or_else(|| failure(action, "no entity store attached"))?;
            let target = target_entity(&inputs, ctx);
            let position = match inputs.get("position") {
                Some(v) => v
                    .as_vec2()
                    .ok_or_else(|| failure(action, "'position' must be a vec2"))?,
                None => Vec2::new(
                    number_or_zero(&inputs, "x", action)?,
                    number_or_zero(&inputs, "y", action)?,
                ),
            };
            store.set_position(&target, position);
            Ok(Value::Vec2(position))
        }
        other => {
            warn!(action = other, "Unknown built-in action, skipping");
            Ok(Value::Null)
        }
    }
}

fn failure(action: &str, message: &str) -> BraidError {
    BraidError::Action {
        component: BUILTIN_COMPONENT.to_string(),
        action: action.to_string(),
        message: message.to_string(),
    }
}

fn target_entity(inputs: &ActionInputs, ctx: &GraphContext) -> String {
    inputs
        .get("entity")
        .and_then(Value::as_str)
        .unwrap_or(ctx.entity_id())
        .to_string()
}

fn number_or_zero(inputs: &ActionInputs, key: &str, action: &str) -> Result<f64> {
    match inputs.get(key) {
        None | Some(Value::Null) => Ok(0.0),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| failure(action, &format!("'{}' must be a number", key))),
    }
}

/// Fill `{name}` placeholders in `template` from the other inputs, or
/// stringify `value` when there is no template.
fn render(inputs: &ActionInputs) -> String {
    let Some(template) = inputs.get("template").and_then(Value::as_str) else {
        return inputs
            .get("value")
            .map(|v| v.to_string())
            .unwrap_or_default();
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match inputs.get(key) {
                    Some(v) if key != "template" => out.push_str(&v.to_string()),
                    _ => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
