//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// Missing fields fall back to their defaults, so a partial JSON document
/// such as `{"label": "editor"}` is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name attached to every log event emitted by the runtime.
    pub label: String,

    /// Upper bound on effect runs within a single flush. Effects that keep
    /// re-triggering each other past this point are dropped and reported.
    pub max_effect_runs: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            label: "ripple".to_owned(),
            max_effect_runs: 10_000,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the runaway guard.
    pub fn with_max_effect_runs(mut self, runs: usize) -> Self {
        self.max_effect_runs = runs;
        self
    }
}
