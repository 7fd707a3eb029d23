use super::builtins;
use crate::ast::{EvaluationTrace, Expression, Program, Statement, Value};
use crate::backend::Namespace;
use crate::error::ScriptError;
use crate::state::State;
use ahash::AHashMap;
use std::collections::BTreeMap;

// This macro generates a match arm for a binary operation.
macro_rules! eval_op {
    ($self:ident, $l:ident, $r:ident, $op:tt, number) => {
        $self.eval_binary($l, $r, stringify!($op), |a, b| match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(Value::Number(x $op y)),
            (a, _) => Err(unsupported(stringify!($op), a)),
        })
    };
    ($self:ident, $l:ident, $r:ident, $op:tt, ordering) => {
        $self.eval_binary($l, $r, stringify!($op), |a, b| match (a, b) {
            (Value::Number(x), Value::Number(y)) => Ok(Value::Bool(x $op y)),
            (Value::Str(x), Value::Str(y)) => Ok(Value::Bool(x $op y)),
            (a, _) => Err(unsupported(stringify!($op), a)),
        })
    };
}

/// The tree-walking evaluator for one script invocation.
pub(super) struct AstEngine<'a> {
    state: Option<&'a State>,
    parameter: Option<&'a str>,
    namespace: Option<&'a Namespace>,
    locals: AHashMap<String, Value>,
}

impl<'a> AstEngine<'a> {
    /// An engine that runs `main(<parameter>)` with the parameter bound to `state`.
    pub(super) fn for_state(state: &'a State, parameter: &'a str) -> Self {
        Self {
            state: Some(state),
            parameter: Some(parameter),
            namespace: None,
            locals: AHashMap::new(),
        }
    }

    pub(super) fn for_namespace(namespace: &'a Namespace) -> Self {
        Self {
            state: None,
            parameter: None,
            namespace: Some(namespace),
            locals: AHashMap::new(),
        }
    }

    /// Executes the body of `main`. Falling off the end returns `None`.
    pub(super) fn run(&mut self, program: &Program) -> Result<EvaluationTrace, ScriptError> {
        for statement in &program.body {
            match statement {
                Statement::Assign { name, value } => {
                    let value = self.evaluate(value)?.get_outcome();
                    self.locals.insert(name.clone(), value);
                }
                Statement::Return(Some(expr)) => return self.evaluate(expr),
                Statement::Return(None) => {
                    return Ok(EvaluationTrace::Leaf {
                        source: "return".to_string(),
                        value: Value::Null,
                        resolved: false,
                    });
                }
                Statement::Expr(expr) => {
                    self.evaluate(expr)?;
                }
                Statement::Pass => {}
            }
        }
        Ok(EvaluationTrace::NotEvaluated)
    }

    pub(super) fn evaluate(&self, expr: &Expression) -> Result<EvaluationTrace, ScriptError> {
        match expr {
            // --- Arithmetic Operations ---
            Expression::Sum(l, r) => self.eval_binary(l, r, "+", |a, b| match (a, b) {
                (Value::Number(x), Value::Number(y)) => Ok(Value::Number(x + y)),
                (Value::Str(x), Value::Str(y)) => {
                    check_string_size("+", x.len().saturating_add(y.len()))?;
                    Ok(Value::Str(x + &y))
                }
                (Value::List(mut x), Value::List(y)) => {
                    x.extend(y);
                    Ok(Value::List(x))
                }
                (a, _) => Err(unsupported("+", a)),
            }),
            Expression::Subtract(l, r) => eval_op!(self, l, r, -, number),
            Expression::Multiply(l, r) => self.eval_binary(l, r, "*", |a, b| match (a, b) {
                (Value::Number(x), Value::Number(y)) => Ok(Value::Number(x * y)),
                (Value::Str(s), Value::Number(n)) | (Value::Number(n), Value::Str(s)) => {
                    repeat(&s, n).map(Value::Str)
                }
                (a, _) => Err(unsupported("*", a)),
            }),
            Expression::Divide(l, r) => self.eval_division(l, r, "/"),
            Expression::Modulo(l, r) => self.eval_division(l, r, "%"),
            Expression::Negate(v) => {
                let child_trace = self.evaluate(v)?;
                let outcome = match child_trace.get_outcome() {
                    Value::Number(n) => Value::Number(-n),
                    val => return Err(type_mismatch("-", "Number", val)),
                };
                Ok(EvaluationTrace::UnaryOp {
                    op_symbol: "-",
                    child: Box::new(child_trace),
                    outcome,
                })
            }

            // --- Comparison Operations ---
            Expression::GreaterThan(l, r) => eval_op!(self, l, r, >, ordering),
            Expression::SmallerThan(l, r) => eval_op!(self, l, r, <, ordering),
            Expression::GreaterThanOrEqual(l, r) => {
                eval_op!(self, l, r, >=, ordering)
            }
            Expression::SmallerThanOrEqual(l, r) => {
                eval_op!(self, l, r, <=, ordering)
            }

            // --- Equality and membership ---
            Expression::Equal(l, r) => {
                self.eval_binary(l, r, "==", |a, b| Ok(Value::Bool(a == b)))
            }
            Expression::NotEqual(l, r) => {
                self.eval_binary(l, r, "!=", |a, b| Ok(Value::Bool(a != b)))
            }
            Expression::In(l, r) => {
                let left_trace = self.evaluate(l)?;
                let right_trace = self.evaluate(r)?;
                let found = self.contains(&right_trace.get_outcome(), &left_trace.get_outcome())?;
                Ok(EvaluationTrace::BinaryOp {
                    op_symbol: "in",
                    left: Box::new(left_trace),
                    right: Box::new(right_trace),
                    outcome: Value::Bool(found),
                })
            }
            Expression::NotIn(l, r) => {
                let left_trace = self.evaluate(l)?;
                let right_trace = self.evaluate(r)?;
                let found = self.contains(&right_trace.get_outcome(), &left_trace.get_outcome())?;
                Ok(EvaluationTrace::BinaryOp {
                    op_symbol: "not in",
                    left: Box::new(left_trace),
                    right: Box::new(right_trace),
                    outcome: Value::Bool(!found),
                })
            }

            // --- Logical Operations ---
            // `and`/`or` short-circuit and yield one of their operands.
            Expression::And(l, r) => {
                let left_trace = self.evaluate(l)?;
                let left_value = left_trace.get_outcome();
                if !left_value.is_truthy() {
                    return Ok(EvaluationTrace::BinaryOp {
                        op_symbol: "and",
                        left: Box::new(left_trace),
                        right: Box::new(EvaluationTrace::NotEvaluated),
                        outcome: left_value,
                    });
                }
                let right_trace = self.evaluate(r)?;
                let outcome = right_trace.get_outcome();
                Ok(EvaluationTrace::BinaryOp {
                    op_symbol: "and",
                    left: Box::new(left_trace),
                    right: Box::new(right_trace),
                    outcome,
                })
            }
            Expression::Or(l, r) => {
                let left_trace = self.evaluate(l)?;
                let left_value = left_trace.get_outcome();
                if left_value.is_truthy() {
                    return Ok(EvaluationTrace::BinaryOp {
                        op_symbol: "or",
                        left: Box::new(left_trace),
                        right: Box::new(EvaluationTrace::NotEvaluated),
                        outcome: left_value,
                    });
                }
                let right_trace = self.evaluate(r)?;
                let outcome = right_trace.get_outcome();
                Ok(EvaluationTrace::BinaryOp {
                    op_symbol: "or",
                    left: Box::new(left_trace),
                    right: Box::new(right_trace),
                    outcome,
                })
            }
            Expression::Not(v) => {
                let child_trace = self.evaluate(v)?;
                let outcome = Value::Bool(!child_trace.get_outcome().is_truthy());
                Ok(EvaluationTrace::UnaryOp {
                    op_symbol: "not",
                    child: Box::new(child_trace),
                    outcome,
                })
            }
            Expression::Conditional {
                then,
                condition,
                otherwise,
            } => {
                if self.evaluate(condition)?.get_outcome().is_truthy() {
                    self.evaluate(then)
                } else {
                    self.evaluate(otherwise)
                }
            }

            // --- Leaves ---
            Expression::Literal(val) => Ok(EvaluationTrace::Leaf {
                source: val.repr(),
                value: val.clone(),
                resolved: false,
            }),
            Expression::Name(name) => Ok(EvaluationTrace::Leaf {
                source: name.clone(),
                value: self.resolve(name)?,
                resolved: true,
            }),
            Expression::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.evaluate(item).map(|t| t.get_outcome()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(EvaluationTrace::Leaf {
                    source: expr.to_string(),
                    value: Value::List(values),
                    resolved: false,
                })
            }

            // --- Access ---
            Expression::Attribute(receiver, name) => {
                let receiver = self.evaluate(receiver)?.get_outcome();
                Ok(self.accessed(expr, self.attribute(receiver, name)?))
            }
            Expression::Index(receiver, index) => {
                let receiver = self.evaluate(receiver)?.get_outcome();
                let index = self.evaluate(index)?.get_outcome();
                Ok(self.accessed(expr, self.index(receiver, index)?))
            }
            Expression::Call { function, args } => {
                let args = self.evaluate_args(args)?;
                Ok(self.accessed(expr, builtins::call_function(function, args)?))
            }
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = self.evaluate(receiver)?.get_outcome();
                let args = self.evaluate_args(args)?;
                let value = match receiver {
                    Value::StateHandle => self.state_method(method, args)?,
                    other => builtins::call_method(other, method, args)?,
                };
                Ok(self.accessed(expr, value))
            }
        }
    }

    fn evaluate_args(&self, args: &[Expression]) -> Result<Vec<Value>, ScriptError> {
        args.iter()
            .map(|arg| self.evaluate(arg).map(|t| t.get_outcome()))
            .collect()
    }

    fn accessed(&self, expr: &Expression, value: Value) -> EvaluationTrace {
        EvaluationTrace::Leaf {
            source: expr.to_string(),
            value,
            resolved: true,
        }
    }

    /// locals, then the `main` parameter, then the namespace, then snapshot labels.
    fn resolve(&self, name: &str) -> Result<Value, ScriptError> {
        if let Some(value) = self.locals.get(name) {
            return Ok(value.clone());
        }
        if self.parameter == Some(name) {
            return Ok(Value::StateHandle);
        }
        if let Some(value) = self.namespace.and_then(|ns| ns.get(name)) {
            return Ok(value.clone());
        }
        if let Some(output) = self.state.and_then(|s| s.snapshot.get(name)) {
            return Ok(Value::Str(output.clone()));
        }
        Err(ScriptError::UnknownName(name.to_string()))
    }

    fn bound_state(&self) -> Result<&'a State, ScriptError> {
        self.state
            .ok_or_else(|| ScriptError::UnknownName("state".to_string()))
    }

    fn attribute(&self, receiver: Value, name: &str) -> Result<Value, ScriptError> {
        match receiver {
            Value::StateHandle => {
                let state = self.bound_state()?;
                match name {
                    "result" => Ok(Value::Str(state.result.clone())),
                    "snapshot" => Ok(Value::Map(
                        state
                            .snapshot
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
                            .collect(),
                    )),
                    "history" => Ok(Value::List(
                        state
                            .history
                            .iter()
                            .map(|m| {
                                let mut entry = BTreeMap::new();
                                entry.insert("role".to_string(), Value::from(m.role.as_str()));
                                entry.insert("content".to_string(), Value::from(m.content.as_str()));
                                Value::Map(entry)
                            })
                            .collect(),
                    )),
                    _ => Err(ScriptError::UnknownAttribute {
                        type_name: "State",
                        attribute: name.to_string(),
                    }),
                }
            }
            Value::Map(mut map) => map.remove(name).ok_or(ScriptError::UnknownAttribute {
                type_name: "Map",
                attribute: name.to_string(),
            }),
            other => Err(ScriptError::UnknownAttribute {
                type_name: other.type_name(),
                attribute: name.to_string(),
            }),
        }
    }

    fn index(&self, receiver: Value, index: Value) -> Result<Value, ScriptError> {
        match (receiver, index) {
            (Value::StateHandle, Value::Str(key)) => {
                Ok(Value::Str(self.bound_state()?.get(&key).to_string()))
            }
            // Missing keys read as "" like the state itself.
            (Value::Map(mut map), Value::Str(key)) => {
                Ok(map.remove(&key).unwrap_or_else(|| Value::Str(String::new())))
            }
            (Value::List(mut items), Value::Number(n)) => {
                let position = normalize_index(n, items.len())?;
                Ok(items.swap_remove(position))
            }
            (Value::Str(s), Value::Number(n)) => {
                let chars: Vec<char> = s.chars().collect();
                let position = normalize_index(n, chars.len())?;
                Ok(Value::Str(chars[position].to_string()))
            }
            (Value::StateHandle | Value::Map(_), key) => Err(type_mismatch("[]", "Str", key)),
            (Value::List(_) | Value::Str(_), key) => Err(type_mismatch("[]", "Number", key)),
            (other, _) => Err(type_mismatch("[]", "List, Str or Map", other)),
        }
    }

    fn contains(&self, container: &Value, item: &Value) -> Result<bool, ScriptError> {
        match (container, item) {
            (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
            (Value::Str(_), other) => Err(type_mismatch("in", "Str", other.clone())),
            (Value::List(items), item) => Ok(items.contains(item)),
            (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(key)),
            (Value::StateHandle, Value::Str(key)) => {
                Ok(self.bound_state()?.snapshot.contains_key(key))
            }
            (other, _) => Err(type_mismatch("in", "Str, List or Map", other.clone())),
        }
    }

    fn state_method(&self, method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let state = self.bound_state()?;
        match method {
            "get" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(ScriptError::ArgumentCount {
                        function: "get".to_string(),
                        expected: "1 or 2".to_string(),
                        found: args.len(),
                    });
                }
                let mut args = args.into_iter();
                let (key, default) = match (args.next(), args.next()) {
                    (Some(Value::Str(key)), default) => (key, default),
                    (Some(other), _) | (None, Some(other)) => {
                        return Err(type_mismatch("get", "Str", other));
                    }
                    (None, None) => return Ok(Value::Null),
                };
                Ok(match state.snapshot.get(&key) {
                    Some(output) => Value::Str(output.clone()),
                    None => default.unwrap_or_else(|| Value::Str(String::new())),
                })
            }
            "keys" => Ok(Value::List(
                state.snapshot.keys().map(|k| Value::Str(k.clone())).collect(),
            )),
            _ => Err(ScriptError::UnknownAttribute {
                type_name: "State",
                attribute: method.to_string(),
            }),
        }
    }

    fn eval_division(
        &self,
        l: &Expression,
        r: &Expression,
        op: &'static str,
    ) -> Result<EvaluationTrace, ScriptError> {
        let left_trace = self.evaluate(l)?;
        let right_trace = self.evaluate(r)?;
        let outcome = match (left_trace.get_outcome(), right_trace.get_outcome()) {
            (Value::Number(_), Value::Number(rv)) if rv == 0.0 => {
                return Err(ScriptError::DivisionByZero);
            }
            (Value::Number(lv), Value::Number(rv)) if op == "/" => Value::Number(lv / rv),
            (Value::Number(lv), Value::Number(rv)) => Value::Number(lv.rem_euclid(rv)),
            (l_val, _) => return Err(type_mismatch(op, "Number", l_val)),
        };
        Ok(EvaluationTrace::BinaryOp {
            op_symbol: op,
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            outcome,
        })
    }

    /// Evaluates both operands, then combines them with `f`.
    fn eval_binary<F>(
        &self,
        l: &Expression,
        r: &Expression,
        op: &'static str,
        f: F,
    ) -> Result<EvaluationTrace, ScriptError>
    where
        F: Fn(Value, Value) -> Result<Value, ScriptError>,
    {
        let left_trace = self.evaluate(l)?;
        let right_trace = self.evaluate(r)?;
        let outcome = f(left_trace.get_outcome(), right_trace.get_outcome())?;
        Ok(EvaluationTrace::BinaryOp {
            op_symbol: op,
            left: Box::new(left_trace),
            right: Box::new(right_trace),
            outcome,
        })
    }
}

/// Upper bound for strings built by `+` and `*`.
pub(super) const MAX_STRING_BYTES: usize = 16 * 1024 * 1024;

fn check_string_size(op: &str, bytes: usize) -> Result<(), ScriptError> {
    if bytes > MAX_STRING_BYTES {
        return Err(ScriptError::ValueTooLarge {
            operation: op.to_string(),
            limit: MAX_STRING_BYTES,
        });
    }
    Ok(())
}

/// `s * n`. Negative counts give an empty string; fractional counts are truncated.
fn repeat(s: &str, n: f64) -> Result<String, ScriptError> {
    // Float to int casts saturate, and NaN becomes 0.
    let count = n.max(0.0) as usize;
    check_string_size("*", s.len().saturating_mul(count))?;
    Ok(s.repeat(count))
}

fn unsupported(op: &str, found: Value) -> ScriptError {
    type_mismatch(op, &expected_operands(op), found)
}

fn expected_operands(op: &str) -> String {
    match op {
        "+" => "two Numbers, Strs or Lists",
        "*" => "Numbers, or a Str and a Number",
        ">" | "<" | ">=" | "<=" => "two Numbers or two Strs",
        _ => "Number",
    }
    .to_string()
}

fn normalize_index(n: f64, length: usize) -> Result<usize, ScriptError> {
    let index = n as i64;
    let position = if index < 0 {
        length as i64 + index
    } else {
        index
    };
    if position < 0 || position >= length as i64 {
        return Err(ScriptError::IndexOutOfRange { index, length });
    }
    Ok(position as usize)
}

pub(super) fn type_mismatch(op: &str, expected: &str, found: Value) -> ScriptError {
    ScriptError::TypeMismatch {
        operation: op.to_string(),
        expected: expected.to_string(),
        found,
    }
}
