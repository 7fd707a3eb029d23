use super::Value;

/// A record of how an expression was evaluated, including intermediate values.
#[derive(Debug, Clone)]
pub enum EvaluationTrace {
    BinaryOp {
        op_symbol: &'static str,
        left: Box<EvaluationTrace>,
        right: Box<EvaluationTrace>,
        outcome: Value,
    },
    UnaryOp {
        op_symbol: &'static str,
        child: Box<EvaluationTrace>,
        outcome: Value,
    },
    /// A literal, or a value read from the state (`resolved` is set for the latter).
    Leaf {
        source: String,
        value: Value,
        resolved: bool,
    },
    NotEvaluated,
}

impl EvaluationTrace {
    pub fn get_outcome(&self) -> Value {
        match self {
            EvaluationTrace::BinaryOp { outcome, .. } => outcome.clone(),
            EvaluationTrace::UnaryOp { outcome, .. } => outcome.clone(),
            EvaluationTrace::Leaf { value, .. } => value.clone(),
            EvaluationTrace::NotEvaluated => Value::Null,
        }
    }

    /// Mirrors `Expression::precedence`.
    pub fn precedence(&self) -> u8 {
        match self {
            EvaluationTrace::BinaryOp { op_symbol, .. } => match *op_symbol {
                "or" => 2,
                "and" => 3,
                "==" | "!=" | ">" | ">=" | "<" | "<=" | "in" | "not in" => 5,
                "+" | "-" => 6,
                "*" | "/" | "%" => 7,
                _ => 0,
            },
            EvaluationTrace::UnaryOp { op_symbol, .. } => match *op_symbol {
                "not" => 4,
                _ => 8,
            },
            EvaluationTrace::Leaf { .. } | EvaluationTrace::NotEvaluated => 10,
        }
    }
}
