use crate::ast::{Expression, Program};
use crate::error::ScriptError;

mod lexer;
mod optimizer;
mod parser;

pub use lexer::{Lexer, Spanned, Token};
pub use optimizer::AstOptimizer;
pub use parser::Parser;

/// Turns script text into optimized ASTs.
pub struct Compiler {
    optimizer: AstOptimizer,
    optimize: bool,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            optimizer: AstOptimizer::new(),
            optimize: true,
        }
    }

    /// Disables constant folding. Useful when inspecting the parsed tree.
    pub fn without_optimization(mut self) -> Self {
        self.optimize = false;
        self
    }

    /// Compiles a `def main(state): ...` program.
    pub fn compile(&self, source: &str) -> Result<Program, ScriptError> {
        let tokens = Lexer::new(source).tokenize()?;
        let program = Parser::new(tokens).parse_program()?;
        Ok(if self.optimize {
            self.optimizer.optimize_program(program)
        } else {
            program
        })
    }

    /// Compiles a bare expression such as `role == "user"`.
    pub fn compile_expression(&self, source: &str) -> Result<Expression, ScriptError> {
        let tokens = Lexer::new(source).tokenize()?;
        let expr = Parser::new(tokens).parse_standalone_expression()?;
        Ok(if self.optimize {
            self.optimizer.optimize(expr)
        } else {
            expr
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Statement, Value};

    fn parse(source: &str) -> Program {
        Compiler::new().without_optimization().compile(source).unwrap()
    }

    #[test]
    fn parses_the_default_condition() {
        let program = parse("def main(state):\n\treturn True");
        assert_eq!(program.parameter, "state");
        assert_eq!(
            program.body,
            vec![Statement::Return(Some(Expression::Literal(Value::Bool(true))))]
        );
    }

    #[test]
    fn parses_one_liner_with_semicolons() {
        let program = parse("def main(s): x = s.result; return x + '1'");
        assert_eq!(program.body.len(), 2);
        assert!(matches!(program.body[0], Statement::Assign { .. }));
    }

    #[test]
    fn missing_main_is_reported() {
        let err = Compiler::new().compile("return True").unwrap_err();
        assert!(matches!(err, ScriptError::MissingMain));

        let err = Compiler::new().compile("def other(state):\n  return 1").unwrap_err();
        assert!(matches!(err, ScriptError::MissingMain));
    }

    #[test]
    fn syntax_errors_carry_a_position() {
        let err = Compiler::new()
            .compile("def main(state):\n    return (1 +")
            .unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { line: 2, .. }));
    }

    #[test]
    fn display_round_trips_precedence() {
        let expr = Compiler::new()
            .without_optimization()
            .compile_expression("(a + b) * c if not x in y else state['k'].lower()")
            .unwrap();
        assert_eq!(
            expr.to_string(),
            "(a + b) * c if not x in y else state[\"k\"].lower()"
        );
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let nested = format!("{}1{}", "(".repeat(3000), ")".repeat(3000));
        let err = Compiler::new().compile_expression(&nested).unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));

        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(Compiler::new().compile_expression(&shallow).is_ok());
    }

    #[test]
    fn long_operator_chains_count_as_nesting() {
        let chain = vec!["1"; 5000].join(" + ");
        let err = Compiler::new().compile_expression(&chain).unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));

        let negations = format!("{}1", "-".repeat(5000));
        assert!(Compiler::new().compile_expression(&negations).is_err());

        let short = vec!["1"; 50].join(" + ");
        assert_eq!(
            Compiler::new().compile_expression(&short).unwrap(),
            Expression::Literal(Value::Number(50.0))
        );
    }

    #[test]
    fn not_in_is_a_single_operator() {
        let expr = Compiler::new()
            .without_optimization()
            .compile_expression("'x' not in state.result")
            .unwrap();
        assert!(matches!(expr, Expression::NotIn(_, _)));
    }
}
