//! Arithmetic expressions used in payload fields
//!
//! Grammar: `+ -` over `* /` over right-associative `**`, unary minus,
//! parentheses, numeric literals and variable names with an optional
//! integer subscript (`len[2]`).
//!
//! Chains of `+ -` and `* /` are kept flat, so tree depth only grows with
//! parentheses, signs and `**`, which the parser caps at `MAX_NESTING`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

pub const MAX_NESTING: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOp {
    Add,
    Sub,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MulOp {
    Mul,
    Div,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PolyExpr {
    Number(f64),
    Var(String),
    Neg(Box<PolyExpr>),
    /// `first (op term)*`, folded left to right
    Sum(Box<PolyExpr>, Vec<(AddOp, PolyExpr)>),
    Product(Box<PolyExpr>, Vec<(MulOp, PolyExpr)>),
    Pow(Box<PolyExpr>, Box<PolyExpr>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExprError {
    pub offset: usize,
    pub message: String,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for ExprError {}

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Num(f64),
    Name(String),
    Op(&'static str),
}

fn tokenize(text: &str) -> Result<Vec<(usize, Tok)>, ExprError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let (offset, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            if i < chars.len() && matches!(chars[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < chars.len() && matches!(chars[j].1, '+' | '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let literal: String = chars[start..i].iter().map(|(_, c)| c).collect();
            let n = literal.parse::<f64>().map_err(|_| ExprError {
                offset,
                message: format!("invalid number '{}'", literal),
            })?;
            out.push((offset, Tok::Num(n)));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let mut name: String = chars[start..i].iter().map(|(_, c)| c).collect();
            if i < chars.len() && chars[i].1 == '[' {
                let mut j = i + 1;
                let digits_start = j;
                while j < chars.len() && chars[j].1.is_ascii_digit() {
                    j += 1;
                }
                if j == digits_start || j >= chars.len() || chars[j].1 != ']' {
                    return Err(ExprError {
                        offset: chars[i].0,
                        message: "expected integer subscript".into(),
                    });
                }
                name.extend(chars[i..=j].iter().map(|(_, c)| c));
                i = j + 1;
            }
            out.push((offset, Tok::Name(name)));
        } else {
            let op = match (c, chars.get(i + 1).map(|(_, c)| *c)) {
                ('*', Some('*')) => "**",
                ('+', _) => "+",
                ('-', _) => "-",
                ('*', _) => "*",
                ('/', _) => "/",
                ('(', _) => "(",
                (')', _) => ")",
                _ => {
                    return Err(ExprError {
                        offset,
                        message: format!("unexpected character '{}'", c),
                    })
                }
            };
            i += op.len();
            out.push((offset, Tok::Op(op)));
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<(usize, Tok)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn eat(&mut self, op: &str) -> bool {
        if matches!(self.tokens.get(self.pos), Some((_, Tok::Op(o))) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn sum(&mut self) -> Result<PolyExpr, ExprError> {
        let first = self.product()?;
        let mut rest = Vec::new();
        loop {
            let op = if self.eat("+") {
                AddOp::Add
            } else if self.eat("-") {
                AddOp::Sub
            } else {
                break;
            };
            rest.push((op, self.product()?));
        }
        Ok(if rest.is_empty() {
            first
        } else {
            PolyExpr::Sum(Box::new(first), rest)
        })
    }

    fn product(&mut self) -> Result<PolyExpr, ExprError> {
        let first = self.unary()?;
        let mut rest = Vec::new();
        loop {
            let op = if self.eat("*") {
                MulOp::Mul
            } else if self.eat("/") {
                MulOp::Div
            } else {
                break;
            };
            rest.push((op, self.unary()?));
        }
        Ok(if rest.is_empty() {
            first
        } else {
            PolyExpr::Product(Box::new(first), rest)
        })
    }

    /// Every nested subexpression passes through here
    fn unary(&mut self) -> Result<PolyExpr, ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("expression nested deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        let expr = self.signed();
        self.depth -= 1;
        expr
    }

    fn signed(&mut self) -> Result<PolyExpr, ExprError> {
        if self.eat("-") {
            return Ok(PolyExpr::Neg(Box::new(self.unary()?)));
        }
        if self.eat("+") {
            return self.unary();
        }
        self.power()
    }

    fn power(&mut self) -> Result<PolyExpr, ExprError> {
        let base = self.atom()?;
        if self.eat("**") {
            let exponent = self.unary()?;
            return Ok(PolyExpr::Pow(Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<PolyExpr, ExprError> {
        match self.tokens.get(self.pos).cloned() {
            Some((_, Tok::Num(n))) => {
                self.pos += 1;
                Ok(PolyExpr::Number(n))
            }
            Some((_, Tok::Name(name))) => {
                self.pos += 1;
                Ok(PolyExpr::Var(name))
            }
            Some((_, Tok::Op("("))) => {
                self.pos += 1;
                let inner = self.sum()?;
                if !self.eat(")") {
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            Some((_, Tok::Op(op))) => Err(self.error(format!("unexpected '{}'", op))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

impl PolyExpr {
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(text)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: text.len(),
            depth: 0,
        };
        let expr = parser.sum()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Every variable name referenced, sorted
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect(&mut names);
        names
    }

    fn collect(&self, names: &mut BTreeSet<String>) {
        match self {
            PolyExpr::Number(_) => {}
            PolyExpr::Var(name) => {
                names.insert(name.clone());
            }
            PolyExpr::Neg(inner) => inner.collect(names),
            PolyExpr::Sum(first, rest) => {
                first.collect(names);
                rest.iter().for_each(|(_, term)| term.collect(names));
            }
            PolyExpr::Product(first, rest) => {
                first.collect(names);
                rest.iter().for_each(|(_, factor)| factor.collect(names));
            }
            PolyExpr::Pow(a, b) => {
                a.collect(names);
                b.collect(names);
            }
        }
    }

    /// Value under an assignment; unknown names are an error
    pub fn evaluate(&self, values: &HashMap<String, f64>) -> Result<f64, String> {
        Ok(match self {
            PolyExpr::Number(n) => *n,
            PolyExpr::Var(name) => {
                *values.get(name).ok_or_else(|| format!("no value for '{}'", name))?
            }
            PolyExpr::Neg(inner) => -inner.evaluate(values)?,
            PolyExpr::Sum(first, rest) => {
                let mut acc = first.evaluate(values)?;
                for (op, term) in rest {
                    let term = term.evaluate(values)?;
                    match op {
                        AddOp::Add => acc += term,
                        AddOp::Sub => acc -= term,
                    }
                }
                acc
            }
            PolyExpr::Product(first, rest) => {
                let mut acc = first.evaluate(values)?;
                for (op, factor) in rest {
                    let factor = factor.evaluate(values)?;
                    match op {
                        MulOp::Mul => acc *= factor,
                        MulOp::Div => acc /= factor,
                    }
                }
                acc
            }
            PolyExpr::Pow(a, b) => a.evaluate(values)?.powf(b.evaluate(values)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str, values: &[(&str, f64)]) -> f64 {
        let values: HashMap<String, f64> =
            values.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        PolyExpr::parse(text).unwrap().evaluate(&values).unwrap()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", &[]), 7.0);
        assert_eq!(eval("2 ** 3 ** 2", &[]), 512.0);
        assert_eq!(eval("-2 ** 2", &[]), -4.0);
        assert_eq!(eval("(1 + 2) * 3", &[]), 9.0);
    }

    #[test]
    fn test_return_expression() {
        let text = "0 * x0 + 1 * x1 + 4 * x4";
        assert_eq!(eval(text, &[("x0", 0.0), ("x1", 0.0), ("x4", 1.0)]), 4.0);
    }

    #[test]
    fn test_variables_collected() {
        let expr = PolyExpr::parse("-10 * x4 + 2.5 * x0 * x0 - len[1]").unwrap();
        let names: Vec<String> = expr.variables().into_iter().collect();
        assert_eq!(names, vec!["len[1]", "x0", "x4"]);
    }

    #[test]
    fn test_errors() {
        assert!(PolyExpr::parse("").is_err());
        assert!(PolyExpr::parse("x +").is_err());
        assert!(PolyExpr::parse("(x").is_err());
        assert!(PolyExpr::parse("x y").is_err());
        assert!(PolyExpr::parse("x[a]").is_err());
        assert!(PolyExpr::parse("x % 2").is_err());
    }

    #[test]
    fn test_long_sums_stay_flat() {
        let text = vec!["x"; 200_000].join(" + ");
        let expr = PolyExpr::parse(&text).unwrap();
        assert!(matches!(&expr, PolyExpr::Sum(_, rest) if rest.len() == 199_999));
        assert_eq!(eval(&text, &[("x", 1.0)]), 200_000.0);
        assert_eq!(eval("10 - 2 - 3", &[]), 5.0);
        assert_eq!(eval("12 / 2 / 3", &[]), 2.0);
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let deep = format!("{}x{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = PolyExpr::parse(&deep).unwrap_err();
        assert!(err.message.contains("nested deeper"));
        assert!(PolyExpr::parse(&"-".repeat(10_000)).is_err());

        let fits = format!("{}x{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(PolyExpr::parse(&fits).unwrap(), PolyExpr::Var("x".into()));
    }

    #[test]
    fn test_unknown_variable_fails_evaluation() {
        let expr = PolyExpr::parse("x1").unwrap();
        assert!(expr.evaluate(&HashMap::new()).is_err());
    }
}
