use super::{Fields, Node};
use crate::backend::{Scope, ScriptEngine};
use crate::error::NodeError;
use crate::state::State;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_FUNC_TEMPLATE: &str = "def main(state):\n\treturn True\n";

/// A labelled piece of script text, persisted as `{label, text}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TextData {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub text: String,
}

impl TextData {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Runs `main(state)` from its script text. A `None` return halts the traversal.
pub struct FunctionNode {
    func: TextData,
    scripts: Arc<dyn ScriptEngine>,
}

impl FunctionNode {
    pub fn new(func: TextData, scripts: Arc<dyn ScriptEngine>) -> Self {
        let func = if func.text.trim().is_empty() {
            TextData::new(func.label, DEFAULT_FUNC_TEMPLATE)
        } else {
            func
        };
        Self { func, scripts }
    }

    pub fn from_source(source: impl Into<String>, scripts: Arc<dyn ScriptEngine>) -> Self {
        Self::new(TextData::new("func", source), scripts)
    }

    pub fn func(&self) -> &TextData {
        &self.func
    }
}

impl Node for FunctionNode {
    fn classname(&self) -> &'static str {
        "FuncNode"
    }

    fn run(
        &self,
        label: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        let evaluation = self.scripts.call_main(&self.func.text, state)?;
        debug!(node = %label, value = %evaluation.value.repr(), "function returned");
        Ok(evaluation.value.into_output())
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "func".to_string(),
            serde_json::to_value(&self.func).unwrap_or_default(),
        );
        fields
    }
}

/// Fails the pass when its expression over the snapshot is falsy; otherwise passes the
/// result through.
pub struct AssertNode {
    assertion: TextData,
    scripts: Arc<dyn ScriptEngine>,
}

impl AssertNode {
    pub fn new(assertion: TextData, scripts: Arc<dyn ScriptEngine>) -> Self {
        let assertion = if assertion.text.trim().is_empty() {
            TextData::new("Assertion", "True")
        } else {
            assertion
        };
        Self { assertion, scripts }
    }
}

impl Node for AssertNode {
    fn classname(&self) -> &'static str {
        "AssertNode"
    }

    fn run(
        &self,
        _: &str,
        _: Option<String>,
        state: &mut State,
    ) -> Result<Option<String>, NodeError> {
        let evaluation = self
            .scripts
            .eval_expression(&self.assertion.text, Scope::State(state))?;
        if !evaluation.value.is_truthy() {
            return Err(NodeError::Assertion(self.assertion.text.clone()));
        }
        Ok(Some(state.result.clone()))
    }

    fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            "assertion".to_string(),
            serde_json::to_value(&self.assertion).unwrap_or_default(),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Interpreter;

    fn scripts() -> Arc<dyn ScriptEngine> {
        Arc::new(Interpreter::new())
    }

    #[test]
    fn empty_function_text_uses_default_template() {
        let node = FunctionNode::new(TextData::new("f", "  "), scripts());
        assert_eq!(node.func().text, DEFAULT_FUNC_TEMPLATE);
        let mut state = State::new();
        assert_eq!(
            node.run("F", None, &mut state).unwrap(),
            Some("True".to_string())
        );
    }

    #[test]
    fn function_returning_none_halts() {
        let node = FunctionNode::from_source("def main(state):\n    return None", scripts());
        assert_eq!(node.run("F", None, &mut State::new()).unwrap(), None);
    }

    #[test]
    fn assertion_reads_snapshot_labels() {
        let node = AssertNode::new(TextData::new("a", "Count == '3'"), scripts());
        let mut state = State::with_result("pass-through");
        state.set("Count", "3");
        assert_eq!(
            node.run("Check", None, &mut state).unwrap(),
            Some("pass-through".to_string())
        );

        state.set("Count", "4");
        assert!(matches!(
            node.run("Check", None, &mut state),
            Err(NodeError::Assertion(_))
        ));
    }
}
