use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning knobs for the traversal loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Yield to the async scheduler between ticks.
    pub yield_between_ticks: bool,
    /// Pause between ticks, in milliseconds.
    pub tick_delay_ms: u64,
    /// Ends the pass as `Stopped` once this many ticks have run.
    pub max_ticks: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            yield_between_ticks: true,
            tick_delay_ms: 0,
            max_ticks: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, FlowError> {
        toml::from_str(content).map_err(|e| FlowError::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = EngineConfig::from_toml_str("tick_delay_ms = 25\nmax_ticks = 1000").unwrap();
        assert!(config.yield_between_ticks);
        assert_eq!(config.tick_delay_ms, 25);
        assert_eq!(config.max_ticks, Some(1000));
    }

    #[test]
    fn rejects_wrong_types() {
        let err = EngineConfig::from_toml_str("tick_delay_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }
}
