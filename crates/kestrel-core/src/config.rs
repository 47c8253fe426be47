//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

/// Evaluation limits and policies, loadable from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nested `eval` calls allowed before a stack overflow (default: 1024)
    pub max_eval_depth: usize,

    /// Refuse to evaluate cyclic block and argument lists (default: true)
    pub detect_cycles: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_eval_depth: 1024,
            detect_cycles: true,
        }
    }
}

impl EngineConfig {
    /// Set the evaluation depth limit
    pub fn with_max_eval_depth(mut self, depth: usize) -> Self {
        self.max_eval_depth = depth;
        self
    }

    /// Turn cycle checks on or off
    pub fn with_detect_cycles(mut self, detect: bool) -> Self {
        self.detect_cycles = detect;
        self
    }

    /// Parse a configuration; missing fields take their defaults.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Render as JSON
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
