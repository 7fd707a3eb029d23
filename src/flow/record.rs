use super::edge::{Condition, NodeId};
use crate::error::FlowError;
use crate::node::Fields;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The persisted form of a flowchart.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FlowRecord {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub connectors: Vec<ConnectorRecord>,
    /// Document-level fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Fields,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub label: String,
    pub classname: String,
    /// Variant fields plus anything else the document carries (canvas coordinates, ...).
    #[serde(flatten)]
    pub fields: Fields,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConnectorRecord {
    pub node1: NodeId,
    pub node2: NodeId,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl FlowRecord {
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FlowError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
