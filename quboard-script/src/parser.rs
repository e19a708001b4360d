//! Recursive-descent parser producing the tagged syntax tree

use crate::ast::*;
use crate::error::ScriptError;
use crate::lexer::{Lexer, TemplatePart, Token, TokenKind};
use std::rc::Rc;

const ASSIGN_OPS: &[(&str, AssignOp)] = &[
    ("=", AssignOp::Set),
    ("+=", AssignOp::Compound(BinaryOp::Add)),
    ("-=", AssignOp::Compound(BinaryOp::Sub)),
    ("*=", AssignOp::Compound(BinaryOp::Mul)),
    ("/=", AssignOp::Compound(BinaryOp::Div)),
    ("%=", AssignOp::Compound(BinaryOp::Rem)),
    ("**=", AssignOp::Compound(BinaryOp::Pow)),
];

/// Deepest statement or expression nesting a program may use
pub const MAX_NESTING: usize = 128;

/// Parse a whole program
pub fn parse_program(source: &str) -> Result<Program, ScriptError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.statement()?);
    }
    Ok(Program { body })
}

/// Parse a single expression, e.g. a template substitution
pub fn parse_expression_at(source: &str, line: usize, column: usize) -> Result<Expr, ScriptError> {
    parse_nested_expression(source, line, column, 0)
}

fn parse_nested_expression(
    source: &str,
    line: usize,
    column: usize,
    depth: usize,
) -> Result<Expr, ScriptError> {
    let tokens = Lexer::at(source, line, column).tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.depth = depth;
    let expr = parser.expression()?;
    if !parser.at_eof() {
        return Err(parser.error("unexpected token after expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    // ------------------------------------------------------------------------
    // Nesting
    // ------------------------------------------------------------------------

    fn descend(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nesting deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `parse` one level deeper
    fn nested<T>(
        &mut self,
        parse: fn(&mut Self) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        self.descend()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // ------------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        let token = self.peek();
        ScriptError::Syntax {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Punct(q) if *q == p)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ScriptError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", p)))
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(w) if w == word)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn end_statement(&mut self) {
        self.eat_punct(";");
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        self.nested(Self::statement_body)
    }

    fn statement_body(&mut self) -> Result<Stmt, ScriptError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.is_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.is_keyword("let") || self.is_keyword("const") || self.is_keyword("var") {
            let stmt = self.declaration()?;
            self.end_statement();
            return Ok(stmt);
        }
        if self.is_keyword("function") {
            self.advance();
            let def = self.function_rest(true)?;
            return Ok(Stmt::Function(def));
        }
        if self.eat_keyword("if") {
            self.expect_punct("(")?;
            let test = self.expression()?;
            self.expect_punct(")")?;
            let then = Box::new(self.statement()?);
            let otherwise = if self.eat_keyword("else") {
                Some(Box::new(self.statement()?))
            } else {
                None
            };
            return Ok(Stmt::If(test, then, otherwise));
        }
        if self.eat_keyword("for") {
            return self.for_statement();
        }
        if self.eat_keyword("while") {
            self.expect_punct("(")?;
            let test = self.expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::While(test, body));
        }
        if self.is_keyword("return") {
            let line = self.advance().line;
            let next = self.peek();
            let bare = next.line > line
                || next.kind == TokenKind::Eof
                || matches!(next.kind, TokenKind::Punct(";") | TokenKind::Punct("}"));
            let value = if bare { None } else { Some(self.expression()?) };
            self.end_statement();
            return Ok(Stmt::Return(value));
        }
        if self.eat_keyword("break") {
            self.end_statement();
            return Ok(Stmt::Break);
        }
        if self.eat_keyword("continue") {
            self.end_statement();
            return Ok(Stmt::Continue);
        }
        let expr = self.expression()?;
        self.end_statement();
        Ok(Stmt::Expr(expr))
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.error("expected '}'"));
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn declaration(&mut self) -> Result<Stmt, ScriptError> {
        self.advance();
        let mut bindings = Vec::new();
        loop {
            let name = self.ident()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            bindings.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Declare(bindings))
    }

    fn for_statement(&mut self) -> Result<Stmt, ScriptError> {
        self.expect_punct("(")?;

        // for (let x of xs) / for (x in obj)
        let decl_offset = match &self.peek().kind {
            TokenKind::Ident(w) if w == "let" || w == "const" || w == "var" => 1,
            _ => 0,
        };
        if let (Some(TokenKind::Ident(name)), Some(TokenKind::Ident(word))) =
            (self.peek_kind_at(decl_offset), self.peek_kind_at(decl_offset + 1))
        {
            if word == "of" || word == "in" {
                let name = name.clone();
                let is_of = word == "of";
                self.pos += decl_offset + 2;
                let target = self.expression()?;
                self.expect_punct(")")?;
                let body = Box::new(self.statement()?);
                return Ok(if is_of {
                    Stmt::ForOf { name, iterable: target, body }
                } else {
                    Stmt::ForIn { name, object: target, body }
                });
            }
        }

        let init = if self.is_punct(";") {
            None
        } else if decl_offset == 1 {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect_punct(";")?;
        let test = if self.is_punct(";") { None } else { Some(self.expression()?) };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") { None } else { Some(self.expression()?) };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For { init, test, update, body })
    }

    /// Parameters and body after `function`; the name is required for declarations
    fn function_rest(&mut self, named: bool) -> Result<Rc<FunctionDef>, ScriptError> {
        let name = match &self.peek().kind {
            TokenKind::Ident(_) => Some(self.ident()?),
            _ if named => return Err(self.error("expected function name")),
            _ => None,
        };
        let params = self.params()?;
        let body = FunctionBody::Block(self.block()?);
        Ok(Rc::new(FunctionDef { name, params, body }))
    }

    fn params(&mut self) -> Result<Vec<String>, ScriptError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.is_punct(")") {
            params.push(self.ident()?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.assignment()
    }

    fn arrow_ahead(&self) -> bool {
        match self.peek_kind_at(0) {
            Some(TokenKind::Ident(_)) => {
                matches!(self.peek_kind_at(1), Some(TokenKind::Punct("=>")))
            }
            Some(TokenKind::Punct("(")) => {
                let mut offset = 1;
                loop {
                    match self.peek_kind_at(offset) {
                        Some(TokenKind::Punct(")")) => {
                            let next = self.peek_kind_at(offset + 1);
                            return matches!(next, Some(TokenKind::Punct("=>")));
                        }
                        Some(TokenKind::Ident(_)) => offset += 1,
                        _ => return false,
                    }
                    match self.peek_kind_at(offset) {
                        Some(TokenKind::Punct(",")) => offset += 1,
                        Some(TokenKind::Punct(")")) => {}
                        _ => return false,
                    }
                }
            }
            _ => false,
        }
    }

    fn arrow(&mut self) -> Result<Expr, ScriptError> {
        let params = if self.is_punct("(") {
            self.params()?
        } else {
            vec![self.ident()?]
        };
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(self.assignment()?)
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
        })))
    }

    fn assignment(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::assignment_body)
    }

    fn assignment_body(&mut self) -> Result<Expr, ScriptError> {
        if self.arrow_ahead() {
            return self.arrow();
        }
        let target = self.conditional()?;
        let op = ASSIGN_OPS
            .iter()
            .find(|(p, _)| self.is_punct(p))
            .map(|(_, op)| *op);
        let Some(op) = op else {
            return Ok(target);
        };
        if !matches!(target, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..)) {
            return Err(self.error("invalid assignment target"));
        }
        self.advance();
        let value = self.assignment()?;
        Ok(Expr::Assign(op, Box::new(target), Box::new(value)))
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let test = self.logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let then = self.assignment()?;
        self.expect_punct(":")?;
        let otherwise = self.assignment()?;
        Ok(Expr::Conditional(Box::new(test), Box::new(then), Box::new(otherwise)))
    }

    // Each link of a left-leaning chain counts as one level of nesting

    fn logical_or(&mut self) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut left = self.logical_and()?;
        while self.eat_punct("||") {
            self.descend()?;
            let right = self.logical_and()?;
            left = Expr::Logical(LogicalOp::Or, Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut left = self.equality()?;
        while self.eat_punct("&&") {
            self.descend()?;
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ScriptError>,
    ) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut left = next(self)?;
        while let Some(op) = ops.iter().find(|(p, _)| self.is_punct(p)).map(|(_, op)| *op) {
            self.advance();
            self.descend()?;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::LooseEq),
                ("!=", BinaryOp::LooseNe),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[
                ("<=", BinaryOp::Le),
                (">=", BinaryOp::Ge),
                ("<", BinaryOp::Lt),
                (">", BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::multiplicative)
    }

    fn multiplicative(&mut self) -> Result<Expr, ScriptError> {
        self.binary_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Self::exponent,
        )
    }

    fn exponent(&mut self) -> Result<Expr, ScriptError> {
        let base = self.unary()?;
        if self.eat_punct("**") {
            let power = self.nested(Self::exponent)?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(power)));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::unary_body)
    }

    fn unary_body(&mut self) -> Result<Expr, ScriptError> {
        let op = if self.eat_punct("!") {
            Some(UnaryOp::Not)
        } else if self.eat_punct("-") {
            Some(UnaryOp::Neg)
        } else if self.eat_punct("+") {
            Some(UnaryOp::Plus)
        } else if self.eat_keyword("typeof") {
            Some(UnaryOp::Typeof)
        } else {
            None
        };
        if let Some(op) = op {
            return Ok(Expr::Unary(op, Box::new(self.unary()?)));
        }
        for (p, increment) in [("++", true), ("--", false)] {
            if self.eat_punct(p) {
                let target = self.unary()?;
                return Ok(Expr::Update {
                    increment,
                    prefix: true,
                    target: Box::new(target),
                });
            }
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let line = self.peek().line;
        let expr = self.call()?;
        for (p, increment) in [("++", true), ("--", false)] {
            if self.is_punct(p) && self.peek().line == line {
                self.advance();
                return Ok(Expr::Update {
                    increment,
                    prefix: false,
                    target: Box::new(expr),
                });
            }
        }
        Ok(expr)
    }

    fn call(&mut self) -> Result<Expr, ScriptError> {
        let depth = self.depth;
        let mut expr = self.primary()?;
        loop {
            if self.is_punct(".") || self.is_punct("[") || self.is_punct("(") {
                self.descend()?;
            }
            if self.eat_punct(".") {
                let name = self.ident()?;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat_punct("[") {
                let index = self.expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_punct("(") {
                let mut args = Vec::new();
                while !self.is_punct(")") {
                    args.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                self.depth = depth;
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Template(parts) => {
                let mut pieces = Vec::with_capacity(parts.len());
                for part in parts {
                    pieces.push(match part {
                        TemplatePart::Text(text) => TemplatePiece::Text(text),
                        TemplatePart::Code { source, line, column } => {
                            let expr = parse_nested_expression(&source, line, column, self.depth)?;
                            TemplatePiece::Expr(expr)
                        }
                    });
                }
                Ok(Expr::Template(pieces))
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                "function" => Ok(Expr::Function(self.function_rest(false)?)),
                _ => Ok(Expr::Ident(word)),
            },
            TokenKind::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => {
                let mut items = Vec::new();
                while !self.is_punct("]") {
                    items.push(self.assignment()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(Expr::Array(items))
            }
            TokenKind::Punct("{") => self.object_rest(),
            TokenKind::Eof => Err(self.error("unexpected end of input")),
            other => Err(ScriptError::Syntax {
                line: token.line,
                column: token.column,
                message: format!("unexpected token {:?}", other),
            }),
        }
    }

    fn object_rest(&mut self) -> Result<Expr, ScriptError> {
        let mut props = Vec::new();
        while !self.is_punct("}") {
            let key = match self.advance().kind {
                TokenKind::Ident(name) => {
                    if !self.is_punct(":") {
                        // shorthand `{ name }`
                        props.push((PropKey::Static(name.clone()), Expr::Ident(name)));
                        if !self.eat_punct(",") {
                            break;
                        }
                        continue;
                    }
                    PropKey::Static(name)
                }
                TokenKind::Str(s) => PropKey::Static(s),
                TokenKind::Number(n) => PropKey::Static(crate::value::format_number(n)),
                TokenKind::Punct("[") => {
                    let key = self.expression()?;
                    self.expect_punct("]")?;
                    PropKey::Computed(key)
                }
                _ => return Err(self.error("expected property key")),
            };
            self.expect_punct(":")?;
            let value = self.assignment()?;
            props.push((key, value));
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct("}")?;
        Ok(Expr::Object(props))
    }
}
