use serde::{Deserialize, Serialize};

/// Pins that carry control flow into a node.
pub const CONTROL_IN_PINS: &[&str] = &["in", "flow"];

/// Default continuation pins, tried in this order.
pub const CONTINUATION_PINS: &[&str] = &["flow", "out"];

/// A connection between two node pins.
///
/// Edges into `in`/`flow` sequence execution; edges into any other pin
/// supply a value that the target pulls when it needs that input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: String,
    #[serde(default = "default_from_pin")]
    pub from_pin: String,
    pub to: String,
    #[serde(default = "default_to_pin")]
    pub to_pin: String,
}

fn default_from_pin() -> String {
    "out".to_string()
}

fn default_to_pin() -> String {
    "in".to_string()
}

impl GraphEdge {
    /// Control edge `from.out → to.in`.
    pub fn flow(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::pin(from, "out", to)
    }

    /// Control edge leaving a named pin (`true`, `body`, `success`, ...).
    pub fn pin(from: impl Into<String>, pin: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            from_pin: pin.into(),
            to: to.into(),
            to_pin: "in".to_string(),
        }
    }

    /// Data edge feeding `to.to_pin` from `from.from_pin`.
    pub fn data(
        from: impl Into<String>,
        from_pin: impl Into<String>,
        to: impl Into<String>,
        to_pin: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            from_pin: from_pin.into(),
            to: to.into(),
            to_pin: to_pin.into(),
        }
    }

    pub fn is_data(&self) -> bool {
        !CONTROL_IN_PINS.contains(&self.to_pin.as_str())
    }
}
