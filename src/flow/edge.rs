use crate::node::Fields;
use serde::{Deserialize, Serialize};

pub type NodeId = String;
pub type EdgeId = String;

/// The branching condition of an edge: script text defining `main(state)`, plus a display label.
/// Blank text means "always true".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(from = "ConditionRepr")]
pub struct Condition {
    pub label: String,
    pub text: String,
}

/// Older documents store the condition as a bare string.
#[derive(Deserialize)]
#[serde(untagged)]
enum ConditionRepr {
    Text(String),
    Full {
        #[serde(default)]
        label: String,
        #[serde(default)]
        text: String,
    },
}

impl From<ConditionRepr> for Condition {
    fn from(repr: ConditionRepr) -> Self {
        match repr {
            ConditionRepr::Text(text) => Condition {
                label: String::new(),
                text,
            },
            ConditionRepr::Full { label, text } => Condition { label, text },
        }
    }
}

impl Condition {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }

    /// A condition whose `main` returns `expr`.
    pub fn returning(label: impl Into<String>, expr: &str) -> Self {
        Self::new(label, format!("def main(state):\n    return {}\n", expr))
    }

    pub fn is_unconditional(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A directed link between two nodes of the same flowchart, referenced by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub condition: Condition,
    /// Persisted connector fields the engine does not interpret.
    pub attributes: Fields,
}

impl Edge {
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}
