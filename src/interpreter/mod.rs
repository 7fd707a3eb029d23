use crate::ast::{Expression, Program};
use crate::backend::{Evaluation, Scope, ScriptEngine};
use crate::compiler::Compiler;
use crate::error::ScriptError;
use crate::state::State;
use ahash::AHashMap;
use std::sync::{Arc, Mutex};
use tracing::trace;

mod builtins;
mod engine;

use engine::AstEngine;

/// The default [`ScriptEngine`]: compiles script text once, caches the AST per source text
/// and walks it for every call.
pub struct Interpreter {
    compiler: Compiler,
    programs: Mutex<AHashMap<String, Arc<Program>>>,
    expressions: Mutex<AHashMap<String, Arc<Expression>>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            compiler: Compiler::new(),
            programs: Mutex::new(AHashMap::new()),
            expressions: Mutex::new(AHashMap::new()),
        }
    }

    fn program(&self, source: &str) -> Result<Arc<Program>, ScriptError> {
        if let Some(program) = self.programs.lock().ok().and_then(|c| c.get(source).cloned()) {
            return Ok(program);
        }
        trace!(len = source.len(), "compiling script");
        let program = Arc::new(self.compiler.compile(source)?);
        if let Ok(mut cache) = self.programs.lock() {
            cache.insert(source.to_string(), Arc::clone(&program));
        }
        Ok(program)
    }

    fn expression(&self, source: &str) -> Result<Arc<Expression>, ScriptError> {
        if let Some(expr) = self
            .expressions
            .lock()
            .ok()
            .and_then(|c| c.get(source).cloned())
        {
            return Ok(expr);
        }
        let expr = Arc::new(self.compiler.compile_expression(source)?);
        if let Ok(mut cache) = self.expressions.lock() {
            cache.insert(source.to_string(), Arc::clone(&expr));
        }
        Ok(expr)
    }

    /// Number of distinct sources compiled so far.
    pub fn cached(&self) -> usize {
        let programs = self.programs.lock().map(|c| c.len()).unwrap_or(0);
        let expressions = self.expressions.lock().map(|c| c.len()).unwrap_or(0);
        programs + expressions
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for Interpreter {
    fn call_main(&self, source: &str, state: &State) -> Result<Evaluation, ScriptError> {
        let program = self.program(source)?;
        let mut engine = AstEngine::for_state(state, &program.parameter);
        let trace = engine.run(&program)?;
        Ok(Evaluation {
            value: trace.get_outcome(),
            trace,
        })
    }

    fn eval_expression(&self, source: &str, scope: Scope<'_>) -> Result<Evaluation, ScriptError> {
        let expr = self.expression(source)?;
        let trace = match scope {
            Scope::State(state) => AstEngine::for_state(state, "state").evaluate(&expr)?,
            Scope::Namespace(namespace) => AstEngine::for_namespace(namespace).evaluate(&expr)?,
        };
        Ok(Evaluation {
            value: trace.get_outcome(),
            trace,
        })
    }
}

