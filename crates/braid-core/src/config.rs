use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BraidError, Result};

pub const DEFAULT_SEED: u64 = 0x5EED;

/// Top-level Braid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BraidConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Graph runtime limits and seeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Base seed for every PRNG handed to contexts and construction scripts.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Upper bound on watch notifications drained in one tick.
    #[serde(default = "default_max_deferred_per_tick")]
    pub max_deferred_per_tick: usize,
    /// Upper bound on iterations of a single `forEach` node.
    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: usize,
    /// Upper bound on nested signal dispatches on one context, counting
    /// `emit-signal` re-entry and `Error` handlers that fail again.
    #[serde(default = "default_max_trigger_depth")]
    pub max_trigger_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            max_deferred_per_tick: default_max_deferred_per_tick(),
            max_loop_iterations: default_max_loop_iterations(),
            max_trigger_depth: default_max_trigger_depth(),
        }
    }
}

fn default_seed() -> u64 { DEFAULT_SEED }
fn default_max_deferred_per_tick() -> usize { 1024 }
fn default_max_loop_iterations() -> usize { 100_000 }
fn default_max_trigger_depth() -> usize { 16 }

/// Retry delay growth after a lifecycle failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    None,
    Linear,
    #[default]
    Exponential,
}

/// What happens once retries are exhausted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackState {
    /// Stay in `error` (terminal).
    #[default]
    Error,
    /// Tear the node down.
    Dispose,
    /// Reset the retry counter and keep retrying forever. Opt-in only.
    Retry,
}

/// Per-node lifecycle policy. The `[lifecycle]` section supplies defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub retry_backoff: Backoff,
    #[serde(default)]
    pub fallback_state: FallbackState,
    /// Swallow this node's `Error` events instead of bubbling them to ancestors.
    #[serde(default)]
    pub error_boundary: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: default_init_timeout_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_backoff: Backoff::default(),
            fallback_state: FallbackState::default(),
            error_boundary: false,
        }
    }
}

fn default_init_timeout_ms() -> u64 { 5000 }
fn default_retry_count() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 100 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String { "braid=info,warn".to_string() }

impl BraidConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| BraidError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| BraidError::Config(e.to_string()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BraidError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = BraidConfig::parse("").unwrap();
        assert_eq!(config.runtime.seed, DEFAULT_SEED);
        assert_eq!(config.runtime.max_deferred_per_tick, 1024);
        assert_eq!(config.runtime.max_trigger_depth, 16);
        assert_eq!(config.lifecycle.retry_count, 3);
        assert_eq!(config.lifecycle.retry_backoff, Backoff::Exponential);
        assert_eq!(config.lifecycle.fallback_state, FallbackState::Error);
        assert_eq!(config.log.filter, "braid=info,warn");
    }

    #[test]
    fn test_lifecycle_section() {
        let config = BraidConfig::parse(
            r#"
[lifecycle]
retry_count = 5
retry_delay_ms = 50
retry_backoff = "linear"
fallback_state = "dispose"
error_boundary = true
"#,
        )
        .unwrap();
        assert_eq!(config.lifecycle.retry_count, 5);
        assert_eq!(config.lifecycle.retry_delay_ms, 50);
        assert_eq!(config.lifecycle.retry_backoff, Backoff::Linear);
        assert_eq!(config.lifecycle.fallback_state, FallbackState::Dispose);
        assert!(config.lifecycle.error_boundary);
        assert_eq!(config.lifecycle.init_timeout_ms, 5000);
    }

    #[test]
    fn test_env_expansion_keeps_unknown_vars() {
        std::env::set_var("BRAID_TEST_FILTER", "braid=trace");
        let out = expand_env_vars("a=${BRAID_TEST_FILTER} b=${BRAID_SURELY_UNSET_VAR}");
        assert_eq!(out, "a=braid=trace b=${BRAID_SURELY_UNSET_VAR}");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = BraidConfig::parse("[runtime\nseed = 1").unwrap_err();
        assert!(matches!(err, BraidError::Config(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = BraidConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = BraidConfig::parse(&text).unwrap();
        assert_eq!(parsed.runtime.seed, config.runtime.seed);
        assert_eq!(parsed.lifecycle, config.lifecycle);
    }
}
