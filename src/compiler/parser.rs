use super::lexer::{Spanned, Token};
use crate::ast::{Expression, Program, Statement, Value};
use crate::error::ScriptError;

/// Deepest expression tree the parser accepts. Evaluation and folding recurse over the
/// tree, so this also bounds their stack use.
pub const MAX_NESTING: usize = 100;

/// Recursive-descent parser over the token stream produced by the lexer.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    /// Parses `def main(<param>): <statements>`.
    pub fn parse_program(&mut self) -> Result<Program, ScriptError> {
        self.skip_separators();
        if !self.eat(&Token::Def) {
            return Err(ScriptError::MissingMain);
        }
        match self.advance() {
            Token::Name(name) if name == "main" => {}
            _ => return Err(ScriptError::MissingMain),
        }
        self.expect(&Token::LParen, "'(' after 'def main'")?;
        let parameter = match self.advance() {
            Token::Name(name) => name,
            _ => return Err(self.error("expected a parameter name")),
        };
        self.expect(&Token::RParen, "')' after the parameter")?;
        self.expect(&Token::Colon, "':' after the signature")?;

        let mut body = Vec::new();
        loop {
            self.skip_separators();
            if self.check(&Token::Eof) {
                break;
            }
            body.push(self.parse_statement()?);
            if !matches!(self.peek(), Token::Newline | Token::Semicolon | Token::Eof) {
                return Err(self.error("expected end of statement"));
            }
        }
        Ok(Program { parameter, body })
    }

    /// Parses a standalone expression (assertions, memory window targets).
    pub fn parse_standalone_expression(&mut self) -> Result<Expression, ScriptError> {
        self.skip_separators();
        let expr = self.parse_expression()?;
        self.skip_separators();
        if !self.check(&Token::Eof) {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn parse_statement(&mut self) -> Result<Statement, ScriptError> {
        match self.peek() {
            Token::Return => {
                self.advance();
                if matches!(self.peek(), Token::Newline | Token::Semicolon | Token::Eof) {
                    Ok(Statement::Return(None))
                } else {
                    Ok(Statement::Return(Some(self.parse_expression()?)))
                }
            }
            Token::Pass => {
                self.advance();
                Ok(Statement::Pass)
            }
            Token::Name(name) if self.peek_at(1) == &Token::Assign => {
                let name = name.clone();
                self.pos += 2;
                let value = self.parse_expression()?;
                Ok(Statement::Assign { name, value })
            }
            _ => Ok(Statement::Expr(self.parse_expression()?)),
        }
    }

    fn parse_expression(&mut self) -> Result<Expression, ScriptError> {
        let depth = self.depth;
        self.descend()?;
        let expr = self.parse_conditional();
        self.depth = depth;
        expr
    }

    fn parse_conditional(&mut self) -> Result<Expression, ScriptError> {
        let then = self.parse_or()?;
        if self.eat(&Token::If) {
            let condition = self.parse_or()?;
            self.expect(&Token::Else, "'else' in conditional expression")?;
            let otherwise = self.parse_expression()?;
            return Ok(Expression::Conditional {
                then: Box::new(then),
                condition: Box::new(condition),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(then)
    }

    // Each operator in a left-associative chain adds a level to the tree, so the chain
    // loops below count against the nesting limit as well.

    fn parse_or(&mut self) -> Result<Expression, ScriptError> {
        let depth = self.depth;
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            self.descend()?;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ScriptError> {
        let depth = self.depth;
        let mut left = self.parse_not()?;
        while self.eat(&Token::And) {
            self.descend()?;
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, ScriptError> {
        if self.eat(&Token::Not) {
            let depth = self.depth;
            self.descend()?;
            let operand = self.parse_not()?;
            self.depth = depth;
            return Ok(Expression::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expression, ScriptError> {
        let depth = self.depth;
        let mut left = self.parse_additive()?;
        loop {
            let make: fn(Box<Expression>, Box<Expression>) -> Expression = match self.peek() {
                Token::EqEq => Expression::Equal,
                Token::NotEq => Expression::NotEqual,
                Token::Gt => Expression::GreaterThan,
                Token::GtEq => Expression::GreaterThanOrEqual,
                Token::Lt => Expression::SmallerThan,
                Token::LtEq => Expression::SmallerThanOrEqual,
                Token::In => Expression::In,
                Token::Not if self.peek_at(1) == &Token::In => {
                    self.pos += 1;
                    Expression::NotIn
                }
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_additive()?;
            left = make(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, ScriptError> {
        let depth = self.depth;
        let mut left = self.parse_term()?;
        loop {
            let make: fn(Box<Expression>, Box<Expression>) -> Expression = match self.peek() {
                Token::Plus => Expression::Sum,
                Token::Minus => Expression::Subtract,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_term()?;
            left = make(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expression, ScriptError> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let make: fn(Box<Expression>, Box<Expression>) -> Expression = match self.peek() {
                Token::Star => Expression::Multiply,
                Token::Slash => Expression::Divide,
                Token::Percent => Expression::Modulo,
                _ => break,
            };
            self.advance();
            self.descend()?;
            let right = self.parse_unary()?;
            left = make(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ScriptError> {
        let negate = if self.eat(&Token::Minus) {
            true
        } else if self.eat(&Token::Plus) {
            false
        } else {
            return self.parse_postfix();
        };
        let depth = self.depth;
        self.descend()?;
        let operand = self.parse_unary()?;
        self.depth = depth;
        Ok(if negate {
            Expression::Negate(Box::new(operand))
        } else {
            operand
        })
    }

    fn parse_postfix(&mut self) -> Result<Expression, ScriptError> {
        let depth = self.depth;
        let mut expr = self.parse_primary()?;
        loop {
            if !matches!(self.peek(), Token::Dot | Token::LBracket) {
                self.depth = depth;
                return Ok(expr);
            }
            self.descend()?;
            if self.eat(&Token::Dot) {
                let name = match self.advance() {
                    Token::Name(name) => name,
                    _ => return Err(self.error("expected an attribute name after '.'")),
                };
                if self.eat(&Token::LParen) {
                    let args = self.parse_arguments(&Token::RParen)?;
                    expr = Expression::MethodCall {
                        receiver: Box::new(expr),
                        method: name,
                        args,
                    };
                } else {
                    expr = Expression::Attribute(Box::new(expr), name);
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expression()?;
                self.expect(&Token::RBracket, "']' after index")?;
                expr = Expression::Index(Box::new(expr), Box::new(index));
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ScriptError> {
        let expr = match self.advance() {
            Token::Number(n) => Expression::Literal(Value::Number(n)),
            Token::Str(s) => Expression::Literal(Value::Str(s)),
            Token::True => Expression::Literal(Value::Bool(true)),
            Token::False => Expression::Literal(Value::Bool(false)),
            Token::None => Expression::Literal(Value::Null),
            Token::Name(name) => {
                if self.eat(&Token::LParen) {
                    let args = self.parse_arguments(&Token::RParen)?;
                    Expression::Call {
                        function: name,
                        args,
                    }
                } else {
                    Expression::Name(name)
                }
            }
            Token::LParen => {
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen, "')'")?;
                inner
            }
            Token::LBracket => Expression::List(self.parse_arguments(&Token::RBracket)?),
            other => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.error(format!("unexpected token {:?}", other)));
            }
        };
        Ok(expr)
    }

    /// Parses a comma separated list up to (and including) `close`. Trailing commas are allowed.
    fn parse_arguments(&mut self, close: &Token) -> Result<Vec<Expression>, ScriptError> {
        let mut args = Vec::new();
        loop {
            if self.eat(close) {
                return Ok(args);
            }
            args.push(self.parse_expression()?);
            if !self.eat(&Token::Comma) {
                self.expect(close, "',' or closing bracket")?;
                return Ok(args);
            }
        }
    }

    // --- token cursor helpers ---

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn descend(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!(
                "expression is nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semicolon) {
            self.advance();
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        let (line, column) = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| (s.line, s.column))
            .unwrap_or((1, 1));
        ScriptError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }
}
