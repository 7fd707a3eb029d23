use crate::ast::{Expression, Program, Statement, Value};

/// Applies simplification passes to a parsed script until it reaches a fixed point.
pub struct AstOptimizer;

impl AstOptimizer {
    pub fn new() -> Self {
        Self
    }

    pub fn optimize_program(&self, program: Program) -> Program {
        let body = program
            .body
            .into_iter()
            .map(|statement| match statement {
                Statement::Assign { name, value } => Statement::Assign {
                    name,
                    value: self.optimize(value),
                },
                Statement::Return(value) => Statement::Return(value.map(|v| self.optimize(v))),
                Statement::Expr(expr) => Statement::Expr(self.optimize(expr)),
                Statement::Pass => Statement::Pass,
            })
            .collect();
        Program {
            parameter: program.parameter,
            body,
        }
    }

    /// Runs the folding pass in a loop until the AST stops changing.
    pub fn optimize(&self, expr: Expression) -> Expression {
        let mut current_expr = expr;
        loop {
            let next = self.fold(current_expr.clone());
            if next == current_expr {
                return next;
            }
            current_expr = next;
        }
    }

    fn fold(&self, expr: Expression) -> Expression {
        // First, recursively optimize the children
        let optimized_expr = match expr {
            Expression::Sum(l, r) => Expression::Sum(self.fold_box(l), self.fold_box(r)),
            Expression::Subtract(l, r) => Expression::Subtract(self.fold_box(l), self.fold_box(r)),
            Expression::Multiply(l, r) => Expression::Multiply(self.fold_box(l), self.fold_box(r)),
            Expression::Divide(l, r) => Expression::Divide(self.fold_box(l), self.fold_box(r)),
            Expression::Modulo(l, r) => Expression::Modulo(self.fold_box(l), self.fold_box(r)),
            Expression::And(l, r) => Expression::And(self.fold_box(l), self.fold_box(r)),
            Expression::Or(l, r) => Expression::Or(self.fold_box(l), self.fold_box(r)),
            Expression::Equal(l, r) => Expression::Equal(self.fold_box(l), self.fold_box(r)),
            Expression::NotEqual(l, r) => Expression::NotEqual(self.fold_box(l), self.fold_box(r)),
            Expression::GreaterThan(l, r) => {
                Expression::GreaterThan(self.fold_box(l), self.fold_box(r))
            }
            Expression::GreaterThanOrEqual(l, r) => {
                Expression::GreaterThanOrEqual(self.fold_box(l), self.fold_box(r))
            }
            Expression::SmallerThan(l, r) => {
                Expression::SmallerThan(self.fold_box(l), self.fold_box(r))
            }
            Expression::SmallerThanOrEqual(l, r) => {
                Expression::SmallerThanOrEqual(self.fold_box(l), self.fold_box(r))
            }
            Expression::In(l, r) => Expression::In(self.fold_box(l), self.fold_box(r)),
            Expression::NotIn(l, r) => Expression::NotIn(self.fold_box(l), self.fold_box(r)),
            Expression::Not(v) => Expression::Not(self.fold_box(v)),
            Expression::Negate(v) => Expression::Negate(self.fold_box(v)),
            Expression::Conditional {
                then,
                condition,
                otherwise,
            } => Expression::Conditional {
                then: self.fold_box(then),
                condition: self.fold_box(condition),
                otherwise: self.fold_box(otherwise),
            },
            Expression::Attribute(receiver, name) => {
                Expression::Attribute(self.fold_box(receiver), name)
            }
            Expression::Index(receiver, index) => {
                Expression::Index(self.fold_box(receiver), self.fold_box(index))
            }
            Expression::Call { function, args } => Expression::Call {
                function,
                args: args.into_iter().map(|a| self.fold(a)).collect(),
            },
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => Expression::MethodCall {
                receiver: self.fold_box(receiver),
                method,
                args: args.into_iter().map(|a| self.fold(a)).collect(),
            },
            Expression::List(items) => {
                Expression::List(items.into_iter().map(|a| self.fold(a)).collect())
            }
            other => other,
        };

        // Second, apply the constant folding rules
        self.apply_folding_rules(optimized_expr)
    }

    fn fold_box(&self, expr: Box<Expression>) -> Box<Expression> {
        Box::new(self.fold(*expr))
    }

    fn apply_folding_rules(&self, expr: Expression) -> Expression {
        use Expression::Literal as Lit;
        match expr {
            Expression::Sum(l, r) => match (*l, *r) {
                (Lit(Value::Number(lv)), Lit(Value::Number(rv))) => Lit(Value::Number(lv + rv)),
                (Lit(Value::Str(lv)), Lit(Value::Str(rv))) => Lit(Value::Str(lv + &rv)),
                (opt_l, opt_r) => Expression::Sum(Box::new(opt_l), Box::new(opt_r)),
            },
            Expression::Subtract(l, r) => match (*l, *r) {
                (Lit(Value::Number(lv)), Lit(Value::Number(rv))) => Lit(Value::Number(lv - rv)),
                (opt_l, opt_r) => Expression::Subtract(Box::new(opt_l), Box::new(opt_r)),
            },
            Expression::Multiply(l, r) => match (*l, *r) {
                (Lit(Value::Number(lv)), Lit(Value::Number(rv))) => Lit(Value::Number(lv * rv)),
                (opt_l, opt_r) => Expression::Multiply(Box::new(opt_l), Box::new(opt_r)),
            },
            // Division and modulo by zero are left for the interpreter to report.
            Expression::Divide(l, r) => match (*l, *r) {
                (Lit(Value::Number(lv)), Lit(Value::Number(rv))) if rv != 0.0 => {
                    Lit(Value::Number(lv / rv))
                }
                (opt_l, opt_r) => Expression::Divide(Box::new(opt_l), Box::new(opt_r)),
            },
            Expression::Negate(v) => match *v {
                Lit(Value::Number(n)) => Lit(Value::Number(-n)),
                opt_v => Expression::Negate(Box::new(opt_v)),
            },
            Expression::Not(v) => match *v {
                Lit(Value::Bool(b)) => Lit(Value::Bool(!b)),
                Expression::Not(inner_v) if is_boolean(&inner_v) => *inner_v,
                opt_v => Expression::Not(Box::new(opt_v)),
            },
            // `or`/`and` return one of their operands, so only fold when the literal decides it.
            Expression::Or(l, r) => match (*l, *r) {
                (Lit(lv), _) if lv.is_truthy() => Lit(lv),
                (Lit(lv), expr) if !lv.is_truthy() => expr,
                (opt_l, opt_r) => Expression::Or(Box::new(opt_l), Box::new(opt_r)),
            },
            Expression::And(l, r) => match (*l, *r) {
                (Lit(lv), _) if !lv.is_truthy() => Lit(lv),
                (Lit(lv), expr) if lv.is_truthy() => expr,
                (opt_l, opt_r) => Expression::And(Box::new(opt_l), Box::new(opt_r)),
            },
            Expression::Equal(l, r) => match (*l, *r) {
                (Lit(lv), Lit(rv)) => Lit(Value::Bool(lv == rv)),
                (opt_l, opt_r) => Expression::Equal(Box::new(opt_l), Box::new(opt_r)),
            },
            Expression::NotEqual(l, r) => match (*l, *r) {
                (Lit(lv), Lit(rv)) => Lit(Value::Bool(lv != rv)),
                (opt_l, opt_r) => Expression::NotEqual(Box::new(opt_l), Box::new(opt_r)),
            },
            Expression::GreaterThan(l, r) => {
                if let (Lit(Value::Number(lv)), Lit(Value::Number(rv))) = (&*l, &*r) {
                    Lit(Value::Bool(lv > rv))
                } else {
                    Expression::GreaterThan(l, r)
                }
            }
            Expression::SmallerThan(l, r) => {
                if let (Lit(Value::Number(lv)), Lit(Value::Number(rv))) = (&*l, &*r) {
                    Lit(Value::Bool(lv < rv))
                } else {
                    Expression::SmallerThan(l, r)
                }
            }
            Expression::Conditional {
                then,
                condition,
                otherwise,
            } => match *condition {
                Lit(c) => {
                    if c.is_truthy() {
                        *then
                    } else {
                        *otherwise
                    }
                }
                condition => Expression::Conditional {
                    then,
                    condition: Box::new(condition),
                    otherwise,
                },
            },
            other => other,
        }
    }
}

impl Default for AstOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// `not not x` only collapses to `x` when `x` already is a bool.
fn is_boolean(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Literal(Value::Bool(_))
            | Expression::Not(_)
            | Expression::Equal(_, _)
            | Expression::NotEqual(_, _)
            | Expression::GreaterThan(_, _)
            | Expression::GreaterThanOrEqual(_, _)
            | Expression::SmallerThan(_, _)
            | Expression::SmallerThanOrEqual(_, _)
            | Expression::In(_, _)
            | Expression::NotIn(_, _)
    )
}
