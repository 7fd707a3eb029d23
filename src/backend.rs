use crate::ast::{EvaluationTrace, Value};
use crate::error::ScriptError;
use crate::state::State;
use ahash::AHashMap;

/// Variables visible to a standalone expression.
pub type Namespace = AHashMap<String, Value>;

/// What a standalone expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum Scope<'a> {
    /// Snapshot labels as bare names, plus `state` itself.
    State(&'a State),
    /// An explicit set of variables (e.g. `role`/`content` for a memory window target).
    Namespace(&'a Namespace),
}

/// The outcome of running a script, with a trace of how the returned value was produced.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub value: Value,
    pub trace: EvaluationTrace,
}

/// The capability the engine uses to run condition and function text.
///
/// Implementations must not mutate the state they are handed; results flow back through the
/// returned value only.
pub trait ScriptEngine: Send + Sync {
    /// Compiles `source` (which must define `main(<param>)`) and calls `main(state)`.
    fn call_main(&self, source: &str, state: &State) -> Result<Evaluation, ScriptError>;

    /// Evaluates a single expression.
    fn eval_expression(&self, source: &str, scope: Scope<'_>) -> Result<Evaluation, ScriptError>;
}
