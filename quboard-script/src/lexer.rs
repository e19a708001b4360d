//! Tokenizer for scoring-program text

use crate::error::ScriptError;

#[derive(Clone, Debug, PartialEq)]
pub enum TemplatePart {
    Text(String),
    /// Source of a `${...}` substitution, parsed later
    Code { source: String, line: usize, column: usize },
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Template(Vec<TemplatePart>),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// Punctuators, longest first so greedy matching works
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "**=", "=>", "==", "!=", "<=", ">=", "&&", "||", "++", "--", "+=", "-=", "*=",
    "/=", "%=", "**", "{", "}", "(", ")", "[", "]", ";", ",", ".", ":", "?", "+", "-", "*", "/",
    "%", "<", ">", "=", "!",
];

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self::at(source, 1, 1)
    }

    /// Lexer whose positions start at `line:column`, for template substitutions
    pub fn at(source: &str, line: usize, column: usize) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line,
            column,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn digit_at(&self, offset: usize) -> bool {
        self.peek_at(offset).is_some_and(|c| c.is_ascii_digit())
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) -> Result<(), ScriptError> {
        loop {
            match (self.peek(), self.peek_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                (Some('/'), Some('*')) => {
                    self.bump();
                    self.bump();
                    loop {
                        match (self.peek(), self.peek_at(1)) {
                            (Some('*'), Some('/')) => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            (Some(_), _) => {
                                self.bump();
                            }
                            (None, _) => return Err(self.error("unterminated comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ScriptError> {
        self.skip_trivia()?;
        let (line, column) = (self.line, self.column);
        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(c) if c.is_ascii_digit() || (c == '.' && self.digit_at(1)) => self.number()?,
            Some(c) if c.is_alphabetic() || c == '_' || c == '$' => self.ident(),
            Some(q @ ('"' | '\'')) => {
                self.bump();
                TokenKind::Str(self.string(q)?)
            }
            Some('`') => {
                self.bump();
                self.template()?
            }
            Some(_) => self.punct()?,
        };
        Ok(Token { kind, line, column })
    }

    fn number(&mut self) -> Result<TokenKind, ScriptError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            let exponent_sign = (c == '+' || c == '-') && text.ends_with(['e', 'E']);
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(format!("invalid number '{}'", text)))
    }

    fn ident(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        TokenKind::Ident(text)
    }

    fn escape(&mut self) -> Result<char, ScriptError> {
        match self.bump() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some(c) => Ok(c),
            None => Err(self.error("unterminated escape")),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, ScriptError> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('\\') => text.push(self.escape()?),
                Some(c) if c == quote => return Ok(text),
                Some('\n') | None => return Err(self.error("unterminated string")),
                Some(c) => text.push(c),
            }
        }
    }

    fn template(&mut self) -> Result<TokenKind, ScriptError> {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated template literal")),
                Some('`') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    text.push(self.escape()?);
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let (line, column) = (self.line, self.column);
                    let source = self.substitution()?;
                    parts.push(TemplatePart::Code { source, line, column });
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(TokenKind::Template(parts))
    }

    /// Raw source up to the `}` closing a `${`, honoring nested braces and strings
    fn substitution(&mut self) -> Result<String, ScriptError> {
        let mut depth = 0usize;
        let mut source = String::new();
        loop {
            let c = self.bump().ok_or_else(|| self.error("unterminated substitution"))?;
            match c {
                '{' => depth += 1,
                '}' if depth == 0 => return Ok(source),
                '}' => depth -= 1,
                '"' | '\'' | '`' => {
                    source.push(c);
                    loop {
                        let inner = self.bump().ok_or_else(|| self.error("unterminated string"))?;
                        source.push(inner);
                        if inner == '\\' {
                            if let Some(escaped) = self.bump() {
                                source.push(escaped);
                            }
                        } else if inner == c {
                            break;
                        }
                    }
                    continue;
                }
                _ => {}
            }
            source.push(c);
        }
    }

    fn punct(&mut self) -> Result<TokenKind, ScriptError> {
        for p in PUNCTUATORS {
            let matches = p.chars().enumerate().all(|(i, pc)| self.peek_at(i) == Some(pc));
            if matches {
                for _ in 0..p.chars().count() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(p));
            }
        }
        let c = self.peek().unwrap_or(' ');
        Err(self.error(format!("unexpected character '{}'", c)))
    }
}
