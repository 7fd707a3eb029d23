use crate::ast::{EvaluationTrace, Value};

/// Formats evaluation traces into human-readable strings
pub struct TraceFormatter;

impl TraceFormatter {
    /// Format an evaluation trace into a human-readable explanation.
    ///
    /// Values read from the state are annotated with what they held at evaluation time,
    /// e.g. `state.result (was "a") == "a"`.
    pub fn format_trace(trace: &EvaluationTrace) -> String {
        Self::format_recursive(trace, 0)
    }

    fn format_recursive(trace: &EvaluationTrace, parent_precedence: u8) -> String {
        let current_precedence = trace.precedence();
        let needs_parens = current_precedence < parent_precedence;

        let mut result = String::new();
        if needs_parens {
            result.push('(');
        }

        match trace {
            EvaluationTrace::BinaryOp {
                op_symbol,
                left,
                right,
                ..
            } => {
                let left_str = Self::format_recursive(left, current_precedence);

                // Short-circuited operators only show the side that decided the outcome.
                if !matches!(**right, EvaluationTrace::NotEvaluated) {
                    let right_str = Self::format_recursive(right, current_precedence + 1);
                    result.push_str(&format!("{} {} {}", left_str, op_symbol, right_str));
                } else {
                    result.push_str(&left_str);
                }
            }
            EvaluationTrace::UnaryOp {
                op_symbol, child, ..
            } => {
                let child_str = Self::format_recursive(child, current_precedence);
                if *op_symbol == "not" {
                    result.push_str(&format!("not {}", child_str));
                } else {
                    result.push_str(&format!("{}{}", op_symbol, child_str));
                }
            }
            EvaluationTrace::Leaf {
                source,
                value,
                resolved,
            } => {
                if *resolved {
                    result.push_str(&format!("{} (was {})", source, Self::format_value(value)));
                } else {
                    result.push_str(source);
                }
            }
            EvaluationTrace::NotEvaluated => {}
        }

        if needs_parens {
            result.push(')');
        }
        result
    }

    fn format_value(value: &Value) -> String {
        const MAX_LEN: usize = 40;
        let repr = value.repr();
        if repr.chars().count() > MAX_LEN {
            let truncated: String = repr.chars().take(MAX_LEN).collect();
            format!("{}...", truncated)
        } else {
            repr
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(source: &str, value: Value, resolved: bool) -> EvaluationTrace {
        EvaluationTrace::Leaf {
            source: source.to_string(),
            value,
            resolved,
        }
    }

    #[test]
    fn annotates_resolved_leaves() {
        let trace = EvaluationTrace::BinaryOp {
            op_symbol: "==",
            left: Box::new(leaf("state.result", Value::from("a"), true)),
            right: Box::new(leaf("\"a\"", Value::from("a"), false)),
            outcome: Value::Bool(true),
        };
        assert_eq!(
            TraceFormatter::format_trace(&trace),
            "state.result (was \"a\") == \"a\""
        );
    }

    #[test]
    fn short_circuit_hides_right_side() {
        let trace = EvaluationTrace::BinaryOp {
            op_symbol: "and",
            left: Box::new(leaf("False", Value::Bool(false), false)),
            right: Box::new(EvaluationTrace::NotEvaluated),
            outcome: Value::Bool(false),
        };
        assert_eq!(TraceFormatter::format_trace(&trace), "False");
    }

    #[test]
    fn parenthesizes_lower_precedence_children() {
        let sum = EvaluationTrace::BinaryOp {
            op_symbol: "+",
            left: Box::new(leaf("1", Value::Number(1.0), false)),
            right: Box::new(leaf("2", Value::Number(2.0), false)),
            outcome: Value::Number(3.0),
        };
        let product = EvaluationTrace::BinaryOp {
            op_symbol: "*",
            left: Box::new(sum),
            right: Box::new(leaf("3", Value::Number(3.0), false)),
            outcome: Value::Number(9.0),
        };
        assert_eq!(TraceFormatter::format_trace(&product), "(1 + 2) * 3");
    }
}
