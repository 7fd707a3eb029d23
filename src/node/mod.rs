//! The contract every unit of work in a flowchart implements, and the built-in node kinds.

use crate::error::NodeError;
use crate::state::State;
use serde_json::{Map, Value as JsonValue};

mod control;
mod memory;
mod script;
mod system;
mod text;

pub use control::{InitNode, StartNode};
pub use memory::{DynamicWindowedMemoryNode, HistoryNode, MemoryNode, WindowedMemoryNode};
pub use script::{AssertNode, FunctionNode, TextData, DEFAULT_FUNC_TEMPLATE};
pub use system::{
    DateNode, EnvNode, InputNode, InputProvider, NoInput, QueuedInput, RandomNode,
};
pub use text::{PromptNode, RegexNode, TagNode};

/// Persisted variant fields of a node (everything besides id, label and classname).
pub type Fields = Map<String, JsonValue>;

/// How the traversal treats a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    /// Canonical entry point of `run`.
    Start,
    /// One-shot entry point of `initialize`.
    Init,
    Task,
}

/// A unit of work. The engine owns the label and the edges; a node only computes.
///
/// `run` may block or fail. It is executed on a worker thread, never on the orchestrator.
pub trait Node: Send + Sync {
    /// Name used in persisted documents, e.g. `FuncNode`.
    fn classname(&self) -> &'static str;

    fn role(&self) -> NodeRole {
        NodeRole::Task
    }

    /// Runs on the orchestrator before `run`; used by kinds that wait for external input.
    fn before(&self, _label: &str, _state: &State) -> Result<Option<String>, NodeError> {
        Ok(None)
    }

    /// The node's effect. `Ok(None)` is the halt signal; `Ok(Some(output))` becomes the new
    /// result and is stored under the node's label by the engine.
    fn run(
        &self,
        label: &str,
        input: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError>;

    /// Pre-flight cost estimate. Records the label so downstream templates resolve.
    fn cost(&self, label: &str, state: &mut State) -> f64 {
        state.set(label, "");
        0.0
    }

    /// Variant fields for persistence.
    fn fields(&self) -> Fields {
        Fields::new()
    }

    /// `true` once a one-shot node can no longer run.
    fn exhausted(&self) -> bool {
        false
    }
}

/// Reads a string field, falling back to `default` when missing.
pub(crate) fn str_field(fields: &Fields, key: &str, default: &str) -> String {
    fields
        .get(key)
        .and_then(JsonValue::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Reads an integer field that may also have been stored as a string.
pub(crate) fn int_field(fields: &Fields, key: &str) -> Option<Result<i64, String>> {
    fields.get(key).map(|value| match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| format!("'{}' is not an integer", n)),
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("'{}' is not an integer", s)),
        other => Err(format!("expected an integer, found {}", other)),
    })
}
