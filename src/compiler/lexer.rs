use crate::error::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    Str(String),
    Number(f64),
    // Keywords
    Def,
    Return,
    Pass,
    If,
    Else,
    And,
    Or,
    Not,
    In,
    True,
    False,
    None,
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Dot,
    Semicolon,
    Assign,
    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    /// Logical line break (ignored inside brackets).
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
    depth: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            depth: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ScriptError> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            // Collapse blank lines.
            let redundant_newline = spanned.token == Token::Newline
                && matches!(
                    tokens.last(),
                    None | Some(Spanned {
                        token: Token::Newline,
                        ..
                    })
                );
            if !redundant_newline {
                tokens.push(spanned);
            }
            if done {
                return Ok(tokens);
            }
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn next_token(&mut self) -> Result<Spanned, ScriptError> {
        // Skip horizontal whitespace, comments and (inside brackets) newlines.
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' if self.depth > 0 => {
                    self.bump();
                }
                '#' => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }

        let (line, column) = (self.line, self.column);
        let spanned = |token| Spanned {
            token,
            line,
            column,
        };

        let Some(c) = self.bump() else {
            return Ok(spanned(Token::Eof));
        };

        let token = match c {
            '\n' => Token::Newline,
            '(' => {
                self.depth += 1;
                Token::LParen
            }
            '[' => {
                self.depth += 1;
                Token::LBracket
            }
            ')' => {
                self.depth = self.depth.saturating_sub(1);
                Token::RParen
            }
            ']' => {
                self.depth = self.depth.saturating_sub(1);
                Token::RBracket
            }
            ',' => Token::Comma,
            ':' => Token::Colon,
            '.' => Token::Dot,
            ';' => Token::Semicolon,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' => self.either('=', Token::EqEq, Token::Assign),
            '>' => self.either('=', Token::GtEq, Token::Gt),
            '<' => self.either('=', Token::LtEq, Token::Lt),
            '!' => {
                if self.chars.peek() == Some(&'=') {
                    self.bump();
                    Token::NotEq
                } else {
                    return Err(self.error("unexpected character '!'"));
                }
            }
            '"' | '\'' => self.string(c)?,
            c if c.is_ascii_digit() => self.number(c)?,
            c if c.is_alphabetic() || c == '_' => self.word(c),
            other => {
                return Err(ScriptError::Syntax {
                    line,
                    column,
                    message: format!("unexpected character '{}'", other),
                });
            }
        };
        Ok(spanned(token))
    }

    fn either(&mut self, next: char, matched: Token, otherwise: Token) -> Token {
        if self.chars.peek() == Some(&next) {
            self.bump();
            matched
        } else {
            otherwise
        }
    }

    fn string(&mut self, quote: char) -> Result<Token, ScriptError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => return Ok(Token::Str(text)),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some(c) => c,
                        None => return Err(self.error("unterminated string literal")),
                    };
                    text.push(escaped);
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn number(&mut self, first: char) -> Result<Token, ScriptError> {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.bump();
                if c != '_' {
                    text.push(c);
                }
            } else if c == '.' && !text.contains('.') {
                self.bump();
                text.push(c);
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("invalid number literal '{}'", text)))
    }

    fn word(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
                text.push(c);
            } else {
                break;
            }
        }
        match text.as_str() {
            "def" => Token::Def,
            "return" => Token::Return,
            "pass" => Token::Pass,
            "if" => Token::If,
            "else" => Token::Else,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "True" | "true" => Token::True,
            "False" | "false" => Token::False,
            "None" | "none" => Token::None,
            _ => Token::Name(text),
        }
    }
}
