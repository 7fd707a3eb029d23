use super::Value;
use std::fmt;

/// The Abstract Syntax Tree of a script expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // Arithmetic
    Sum(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Modulo(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),

    // Logical
    Not(Box<Expression>),
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),

    // Comparison
    Equal(Box<Expression>, Box<Expression>),
    NotEqual(Box<Expression>, Box<Expression>),
    GreaterThan(Box<Expression>, Box<Expression>),
    GreaterThanOrEqual(Box<Expression>, Box<Expression>),
    SmallerThan(Box<Expression>, Box<Expression>),
    SmallerThanOrEqual(Box<Expression>, Box<Expression>),
    In(Box<Expression>, Box<Expression>),
    NotIn(Box<Expression>, Box<Expression>),

    /// `then if condition else otherwise`
    Conditional {
        then: Box<Expression>,
        condition: Box<Expression>,
        otherwise: Box<Expression>,
    },

    // Access
    Attribute(Box<Expression>, String),
    Index(Box<Expression>, Box<Expression>),
    Call {
        function: String,
        args: Vec<Expression>,
    },
    MethodCall {
        receiver: Box<Expression>,
        method: String,
        args: Vec<Expression>,
    },
    List(Vec<Expression>),

    // Leaf nodes
    Literal(Value),
    Name(String),
}

/// A single statement in the body of `main`.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign { name: String, value: Expression },
    Return(Option<Expression>),
    Expr(Expression),
    Pass,
}

/// A compiled `def main(<parameter>): ...` script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub parameter: String,
    pub body: Vec<Statement>,
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with_precedence(f, 0)
    }
}

impl Expression {
    /// Gets the precedence level for an expression type. Higher numbers bind more tightly.
    pub fn precedence(&self) -> u8 {
        match self {
            Expression::Conditional { .. } => 1,
            Expression::Or(_, _) => 2,
            Expression::And(_, _) => 3,
            Expression::Not(_) => 4,
            Expression::Equal(_, _)
            | Expression::NotEqual(_, _)
            | Expression::GreaterThan(_, _)
            | Expression::GreaterThanOrEqual(_, _)
            | Expression::SmallerThan(_, _)
            | Expression::SmallerThanOrEqual(_, _)
            | Expression::In(_, _)
            | Expression::NotIn(_, _) => 5,
            Expression::Sum(_, _) | Expression::Subtract(_, _) => 6,
            Expression::Multiply(_, _) | Expression::Divide(_, _) | Expression::Modulo(_, _) => 7,
            Expression::Negate(_) => 8,
            Expression::Attribute(_, _)
            | Expression::Index(_, _)
            | Expression::Call { .. }
            | Expression::MethodCall { .. } => 9,
            Expression::List(_) | Expression::Literal(_) | Expression::Name(_) => 10,
        }
    }

    /// The operator symbol of a binary expression, if it is one.
    pub fn binary_symbol(&self) -> Option<&'static str> {
        let symbol = match self {
            Expression::Sum(_, _) => "+",
            Expression::Subtract(_, _) => "-",
            Expression::Multiply(_, _) => "*",
            Expression::Divide(_, _) => "/",
            Expression::Modulo(_, _) => "%",
            Expression::And(_, _) => "and",
            Expression::Or(_, _) => "or",
            Expression::Equal(_, _) => "==",
            Expression::NotEqual(_, _) => "!=",
            Expression::GreaterThan(_, _) => ">",
            Expression::GreaterThanOrEqual(_, _) => ">=",
            Expression::SmallerThan(_, _) => "<",
            Expression::SmallerThanOrEqual(_, _) => "<=",
            Expression::In(_, _) => "in",
            Expression::NotIn(_, _) => "not in",
            _ => return None,
        };
        Some(symbol)
    }

    /// Recursively formats the expression, adding parentheses only when necessary.
    fn fmt_with_precedence(&self, f: &mut fmt::Formatter<'_>, parent_precedence: u8) -> fmt::Result {
        let current_precedence = self.precedence();
        let needs_parens = current_precedence < parent_precedence;

        if needs_parens {
            write!(f, "(")?;
        }

        match self {
            Expression::Sum(l, r)
            | Expression::Subtract(l, r)
            | Expression::Multiply(l, r)
            | Expression::Divide(l, r)
            | Expression::Modulo(l, r)
            | Expression::And(l, r)
            | Expression::Or(l, r)
            | Expression::Equal(l, r)
            | Expression::NotEqual(l, r)
            | Expression::GreaterThan(l, r)
            | Expression::GreaterThanOrEqual(l, r)
            | Expression::SmallerThan(l, r)
            | Expression::SmallerThanOrEqual(l, r)
            | Expression::In(l, r)
            | Expression::NotIn(l, r) => {
                let op = self.binary_symbol().unwrap_or("?");
                l.fmt_with_precedence(f, current_precedence)?;
                write!(f, " {} ", op)?;
                // Left-associative: the right operand needs parens at equal precedence.
                r.fmt_with_precedence(f, current_precedence + 1)?;
            }
            Expression::Negate(v) => {
                write!(f, "-")?;
                v.fmt_with_precedence(f, current_precedence)?;
            }
            Expression::Not(v) => {
                write!(f, "not ")?;
                v.fmt_with_precedence(f, current_precedence)?;
            }
            Expression::Conditional {
                then,
                condition,
                otherwise,
            } => {
                then.fmt_with_precedence(f, current_precedence + 1)?;
                write!(f, " if ")?;
                condition.fmt_with_precedence(f, current_precedence + 1)?;
                write!(f, " else ")?;
                otherwise.fmt_with_precedence(f, current_precedence)?;
            }
            Expression::Attribute(receiver, name) => {
                receiver.fmt_with_precedence(f, current_precedence)?;
                write!(f, ".{}", name)?;
            }
            Expression::Index(receiver, index) => {
                receiver.fmt_with_precedence(f, current_precedence)?;
                write!(f, "[")?;
                index.fmt_with_precedence(f, 0)?;
                write!(f, "]")?;
            }
            Expression::Call { function, args } => {
                write!(f, "{}(", function)?;
                fmt_args(f, args)?;
                write!(f, ")")?;
            }
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                receiver.fmt_with_precedence(f, current_precedence)?;
                write!(f, ".{}(", method)?;
                fmt_args(f, args)?;
                write!(f, ")")?;
            }
            Expression::List(items) => {
                write!(f, "[")?;
                fmt_args(f, items)?;
                write!(f, "]")?;
            }
            Expression::Literal(v) => write!(f, "{}", v.repr())?,
            Expression::Name(name) => write!(f, "{}", name)?,
        }

        if needs_parens {
            write!(f, ")")?;
        }
        Ok(())
    }
}

fn fmt_args(f: &mut fmt::Formatter<'_>, args: &[Expression]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        arg.fmt_with_precedence(f, 0)?;
    }
    Ok(())
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign { name, value } => write!(f, "{} = {}", name, value),
            Statement::Return(Some(value)) => write!(f, "return {}", value),
            Statement::Return(None) => write!(f, "return"),
            Statement::Expr(expr) => write!(f, "{}", expr),
            Statement::Pass => write!(f, "pass"),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "def main({}):", self.parameter)?;
        for statement in &self.body {
            writeln!(f, "    {}", statement)?;
        }
        Ok(())
    }
}
