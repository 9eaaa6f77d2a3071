//! Engine Configuration
//!
//! Limits and defaults applied to every run. All fields have defaults, so
//! a config file only needs the values it changes:
//!
//! ```yaml
//! max_steps: 5000
//! default_element_timeout_ms: 8000
//! sub_workflow_scope: isolated
//! ```

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ceiling on step dispatches per run.
pub const DEFAULT_MAX_STEPS: usize = 2000;

/// Default limit on nested sub-workflow calls.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// How a sub-workflow sees its caller's variables.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VariableScope {
    /// The child reads and writes the caller's store.
    #[default]
    Shared,
    /// The child works on a copy that is discarded on return.
    Isolated,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Step dispatches allowed per run, sub-workflows included
    pub max_steps: usize,

    /// Deepest allowed sub-workflow nesting
    pub max_nesting_depth: usize,

    /// Element timeout when a step does not set one
    pub default_element_timeout_ms: u64,

    /// Swipe duration when a step does not set one
    pub default_swipe_duration_ms: u64,

    /// Interval between snapshot polls in `read_to_variable`
    pub poll_interval_ms: u64,

    pub sub_workflow_scope: VariableScope,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            default_element_timeout_ms: 5000,
            default_swipe_duration_ms: 300,
            poll_interval_ms: 500,
            sub_workflow_scope: VariableScope::Shared,
        }
    }
}

impl EngineConfig {
    /// Loads a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&content)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}
