//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::history::DEFAULT_HISTORY_SIZE;

/// Tunables for a [`crate::NodesContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum undo patches kept.
    pub history_max_size: usize,
    /// Reject row data stamped with another schema version.
    pub strict_schema_version: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_max_size: DEFAULT_HISTORY_SIZE,
            strict_schema_version: true,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Override the history size.
    #[must_use]
    pub const fn with_history_max_size(mut self, size: usize) -> Self {
        self.history_max_size = size;
        self
    }
}
