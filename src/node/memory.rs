use super::{Fields, Node};
use crate::ast::Value;
use crate::backend::{Namespace, Scope, ScriptEngine};
use crate::error::NodeError;
use crate::state::{Message, Role, State};
use std::sync::Arc;

/// Appends the current result to the history under `role`, passing the result on.
pub struct HistoryNode {
    role: Role,
}

impl HistoryNode {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

impl Node for HistoryNode {
    fn classname(&self) -> &'static str {
        "HistoryNode"
    }

    fn run(
        &self,
        _: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        let content = state.result.clone();
        state.push_message(self.role, content.clone());
        Ok(Some(content))
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("role".to_string(), self.role.as_str().into());
        fields
    }
}

fn render(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the full history as `role: content` lines.
#[derive(Debug, Default)]
pub struct MemoryNode;

impl Node for MemoryNode {
    fn classname(&self) -> &'static str {
        "MemoryNode"
    }

    fn run(
        &self,
        _: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        Ok(Some(render(&state.history)))
    }
}

/// Truncates the history to the last `window` messages, then renders it.
pub struct WindowedMemoryNode {
    window: usize,
}

impl WindowedMemoryNode {
    pub const DEFAULT_WINDOW: usize = 100;

    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for WindowedMemoryNode {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

impl Node for WindowedMemoryNode {
    fn classname(&self) -> &'static str {
        "WindowedMemoryNode"
    }

    fn run(
        &self,
        _: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        let excess = state.history.len().saturating_sub(self.window);
        state.history.drain(..excess);
        Ok(Some(render(&state.history)))
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("window".to_string(), (self.window as u64).into());
        fields
    }
}

/// Renders the history starting at the first message for which `target` is truthy.
/// `target` sees `role` and `content` as variables. An empty target keeps everything.
pub struct DynamicWindowedMemoryNode {
    target: String,
    scripts: Arc<dyn ScriptEngine>,
}

impl DynamicWindowedMemoryNode {
    pub fn new(target: impl Into<String>, scripts: Arc<dyn ScriptEngine>) -> Self {
        Self {
            target: target.into(),
            scripts,
        }
    }
}

impl Node for DynamicWindowedMemoryNode {
    fn classname(&self) -> &'static str {
        "DynamicWindowedMemoryNode"
    }

    fn run(
        &self,
        _: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        if self.target.trim().is_empty() {
            return Ok(Some(render(&state.history)));
        }
        let mut from = 0;
        for (i, message) in state.history.iter().enumerate() {
            let mut namespace = Namespace::new();
            namespace.insert("role".to_string(), Value::from(message.role.as_str()));
            namespace.insert("content".to_string(), Value::from(message.content.as_str()));
            let evaluation = self
                .scripts
                .eval_expression(&self.target, Scope::Namespace(&namespace))?;
            if evaluation.value.is_truthy() {
                from = i;
                break;
            }
        }
        Ok(Some(render(&state.history[from..])))
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("target".to_string(), self.target.clone().into());
        fields
    }
}
