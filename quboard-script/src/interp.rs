//! Tree-walking interpreter with a step budget and call-depth limit
//!
//! Each `Interpreter` owns a fresh global scope. Nothing is shared between
//! instances, so a program run cannot observe any earlier run.

use crate::ast::*;
use crate::error::ScriptError;
use crate::value::{format_number, Builtin, Closure, Frame, Namespace, Object, Scope, Value};
use std::cell::RefCell;
use std::rc::Rc;

// ============================================================================
// LIMITS
// ============================================================================

pub const DEFAULT_STEP_BUDGET: u64 = 100_000;
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;
pub const DEFAULT_MAX_STRING_LEN: usize = 1 << 20;
pub const DEFAULT_MAX_ARRAY_LEN: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    /// Statements, loop iterations and calls allowed per run
    pub step_budget: u64,
    pub max_call_depth: usize,
    /// Longest string a program may build, in bytes
    pub max_string_len: usize,
    pub max_array_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            step_budget: DEFAULT_STEP_BUDGET,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_array_len: DEFAULT_MAX_ARRAY_LEN,
        }
    }
}

impl Limits {
    /// Text form of `value`, failing once it passes `max_string_len`
    pub(crate) fn text(&self, value: &Value) -> Result<String, ScriptError> {
        let text = value.render(self.max_string_len);
        self.check_string(text.len())?;
        Ok(text)
    }

    pub(crate) fn check_string(&self, len: usize) -> Result<(), ScriptError> {
        if len > self.max_string_len {
            return Err(ScriptError::SizeLimit {
                what: "string length",
                limit: self.max_string_len,
            });
        }
        Ok(())
    }

    pub(crate) fn check_array(&self, len: usize) -> Result<(), ScriptError> {
        if len > self.max_array_len {
            return Err(ScriptError::SizeLimit {
                what: "array length",
                limit: self.max_array_len,
            });
        }
        Ok(())
    }
}

enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

// ============================================================================
// INTERPRETER
// ============================================================================

pub struct Interpreter {
    limits: Limits,
    steps: u64,
    depth: usize,
    trace: Vec<String>,
    trace_len: usize,
    globals: Scope,
}

impl Interpreter {
    pub fn new(limits: Limits) -> Self {
        let globals: Scope = Rc::new(RefCell::new(Frame::default()));
        {
            let mut frame = globals.borrow_mut();
            for (name, ns) in [
                ("Math", Namespace::Math),
                ("Object", Namespace::Object),
                ("console", Namespace::Console),
                ("JSON", Namespace::Json),
                ("Array", Namespace::Array),
            ] {
                frame.vars.insert(name.to_string(), Value::Namespace(ns));
            }
            for (name, builtin) in [
                ("parseInt", Builtin::ParseInt),
                ("parseFloat", Builtin::ParseFloat),
                ("String", Builtin::String),
                ("Number", Builtin::Number),
                ("isNaN", Builtin::IsNaN),
            ] {
                frame.vars.insert(name.to_string(), Value::Builtin(builtin));
            }
            frame.vars.insert("NaN".to_string(), Value::Number(f64::NAN));
            frame.vars.insert("Infinity".to_string(), Value::Number(f64::INFINITY));
        }
        Self {
            limits,
            steps: 0,
            depth: 0,
            trace: Vec::new(),
            trace_len: 0,
            globals,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn take_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace)
    }

    pub(crate) fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Console lines past `max_string_len` bytes in total are dropped
    pub(crate) fn log(&mut self, line: String) {
        if self.trace_len + line.len() <= self.limits.max_string_len {
            self.trace_len += line.len();
            self.trace.push(line);
        }
    }

    /// Run top-level statements, defining globals
    pub fn load(&mut self, program: &Program) -> Result<(), ScriptError> {
        let globals = Rc::clone(&self.globals);
        match self.exec_block(&program.body, &globals)? {
            Flow::Normal => Ok(()),
            Flow::Return(_) => Err(ScriptError::runtime("'return' outside of a function")),
            Flow::Break | Flow::Continue => {
                Err(ScriptError::runtime("'break' or 'continue' outside of a loop"))
            }
        }
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().vars.get(name).cloned()
    }

    /// Call a global function by name
    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        let callee = self
            .global(name)
            .ok_or_else(|| ScriptError::runtime(format!("{} is not defined", name)))?;
        self.call_value(&callee, args)
    }

    fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.limits.step_budget {
            return Err(ScriptError::StepBudget(self.limits.step_budget));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    fn lookup(scope: &Scope, name: &str) -> Option<Value> {
        let mut current = Some(Rc::clone(scope));
        while let Some(frame) = current {
            let frame = frame.borrow();
            if let Some(value) = frame.vars.get(name) {
                return Some(value.clone());
            }
            current = frame.parent.clone();
        }
        None
    }

    fn declare(scope: &Scope, name: &str, value: Value) {
        scope.borrow_mut().vars.insert(name.to_string(), value);
    }

    /// Assign to the nearest binding; undeclared names become globals
    fn assign_var(&self, scope: &Scope, name: &str, value: Value) {
        let mut current = Some(Rc::clone(scope));
        while let Some(frame) = current {
            if let Some(slot) = frame.borrow_mut().vars.get_mut(name) {
                *slot = value;
                return;
            }
            current = frame.borrow().parent.clone();
        }
        Self::declare(&self.globals, name, value);
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt], scope: &Scope) -> Result<Flow, ScriptError> {
        for stmt in body {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let closure = Closure {
                        def: Rc::clone(def),
                        scope: Rc::clone(scope),
                    };
                    Self::declare(scope, name, Value::Function(Rc::new(closure)));
                }
            }
        }
        for stmt in body {
            match self.exec(stmt, scope)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Scope) -> Result<Flow, ScriptError> {
        self.tick()?;
        match stmt {
            Stmt::Empty | Stmt::Function(_) => Ok(Flow::Normal),
            Stmt::Declare(bindings) => {
                for (name, init) in bindings {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        None => Value::Undefined,
                    };
                    Self::declare(scope, name, value);
                }
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Block(body) => {
                let inner = Frame::child(scope);
                self.exec_block(body, &inner)
            }
            Stmt::If(test, then, otherwise) => {
                if self.eval(test, scope)?.truthy() {
                    self.exec(then, scope)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While(test, body) => {
                while self.eval(test, scope)?.truthy() {
                    self.tick()?;
                    match self.exec(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For { init, test, update, body } => {
                let loop_scope = Frame::child(scope);
                if let Some(init) = init {
                    self.exec(init, &loop_scope)?;
                }
                loop {
                    self.tick()?;
                    if let Some(test) = test {
                        if !self.eval(test, &loop_scope)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &loop_scope)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &loop_scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf { name, iterable, body } => {
                let items = match self.eval(iterable, scope)? {
                    Value::Array(items) => items.borrow().clone(),
                    Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
                    other => {
                        let message = format!("{} is not iterable", other.describe());
                        return Err(ScriptError::runtime(message));
                    }
                };
                self.run_each(name, items, body, scope)
            }
            Stmt::ForIn { name, object, body } => {
                let keys = match self.eval(object, scope)? {
                    Value::Object(object) => object
                        .borrow()
                        .entries()
                        .iter()
                        .map(|(k, _)| Value::str(k))
                        .collect(),
                    Value::Array(items) => {
                        (0..items.borrow().len()).map(|i| Value::str(i.to_string())).collect()
                    }
                    _ => Vec::new(),
                };
                self.run_each(name, keys, body, scope)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
        }
    }

    fn run_each(
        &mut self,
        name: &str,
        items: Vec<Value>,
        body: &Stmt,
        scope: &Scope,
    ) -> Result<Flow, ScriptError> {
        for item in items {
            self.tick()?;
            let iteration = Frame::child(scope);
            Self::declare(&iteration, name, item);
            match self.exec(body, &iteration)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal)
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    pub(crate) fn eval(&mut self, expr: &Expr, scope: &Scope) -> Result<Value, ScriptError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template(pieces) => {
                let mut out = String::new();
                for piece in pieces {
                    match piece {
                        TemplatePiece::Text(text) => out.push_str(text),
                        TemplatePiece::Expr(expr) => {
                            let value = self.eval(expr, scope)?;
                            out.push_str(&self.limits.text(&value)?);
                        }
                    }
                    self.limits.check_string(out.len())?;
                }
                Ok(Value::str(out))
            }
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, scope)?);
                }
                Ok(Value::array(values))
            }
            Expr::Object(props) => {
                let mut object = Object::new();
                for (key, value) in props {
                    let key = match key {
                        PropKey::Static(k) => k.clone(),
                        PropKey::Computed(expr) => {
                            let key = self.eval(expr, scope)?;
                            self.limits.text(&key)?
                        }
                    };
                    let value = self.eval(value, scope)?;
                    object.set(key, value);
                }
                Ok(Value::object(object))
            }
            Expr::Ident(name) => {
                Self::lookup(scope, name)
                    .ok_or_else(|| ScriptError::runtime(format!("{} is not defined", name)))
            }
            Expr::Member(object, name) => {
                let object = self.eval(object, scope)?;
                get_property(&object, name)
            }
            Expr::Index(object, key) => {
                let object = self.eval(object, scope)?;
                let key = self.eval(key, scope)?;
                get_index(&object, &key)
            }
            Expr::Call(callee, args) => self.eval_call(callee, args, scope),
            Expr::Unary(op, operand) => {
                if let (UnaryOp::Typeof, Expr::Ident(name)) = (op, operand.as_ref()) {
                    let value = Self::lookup(scope, name).unwrap_or(Value::Undefined);
                    return Ok(Value::str(value.type_name()));
                }
                let value = self.eval(operand, scope)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::Typeof => Value::str(value.type_name()),
                })
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                binary(*op, &left, &right, &self.limits)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left, scope)?;
                match (op, left.truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right, scope),
                }
            }
            Expr::Conditional(test, then, otherwise) => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(then, scope)
                } else {
                    self.eval(otherwise, scope)
                }
            }
            Expr::Assign(op, target, value) => {
                let value = match op {
                    AssignOp::Set => self.eval(value, scope)?,
                    AssignOp::Compound(bin) => {
                        let current = self.eval(target, scope)?;
                        let rhs = self.eval(value, scope)?;
                        binary(*bin, &current, &rhs, &self.limits)?
                    }
                };
                self.store(target, value.clone(), scope)?;
                Ok(value)
            }
            Expr::Update { increment, prefix, target } => {
                let old = self.eval(target, scope)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.store(target, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Function(def) => Ok(Value::Function(Rc::new(Closure {
                def: Rc::clone(def),
                scope: Rc::clone(scope),
            }))),
        }
    }

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        scope: &Scope,
    ) -> Result<Value, ScriptError> {
        if let Expr::Member(receiver, name) = callee {
            let receiver = self.eval(receiver, scope)?;
            let args = self.eval_args(args, scope)?;
            if let Value::Object(object) = &receiver {
                let own = object.borrow().get(name).cloned();
                if let Some(f @ (Value::Function(_) | Value::Builtin(_))) = own {
                    return self.call_value(&f, args);
                }
            }
            return self.call_method(receiver, name, args);
        }
        let function = self.eval(callee, scope)?;
        let args = self.eval_args(args, scope)?;
        self.call_value(&function, args)
    }

    fn eval_args(&mut self, args: &[Expr], scope: &Scope) -> Result<Vec<Value>, ScriptError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, scope)?);
        }
        Ok(values)
    }

    pub(crate) fn call_value(
        &mut self,
        function: &Value,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        match function {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Builtin(builtin) => crate::builtins::call_builtin(*builtin, &args, &self.limits),
            other => Err(ScriptError::runtime(format!("{} is not a function", other.describe()))),
        }
    }

    fn call_closure(
        &mut self,
        closure: &Rc<Closure>,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        self.tick()?;
        if self.depth >= self.limits.max_call_depth {
            return Err(ScriptError::CallDepth(self.limits.max_call_depth));
        }
        let frame = Frame::child(&closure.scope);
        let mut args = args.into_iter();
        for param in &closure.def.params {
            Self::declare(&frame, param, args.next().unwrap_or(Value::Undefined));
        }

        self.depth += 1;
        let result = match &closure.def.body {
            FunctionBody::Block(body) => self.exec_block(body, &frame).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Value::Undefined,
            }),
            FunctionBody::Expr(expr) => self.eval(expr, &frame),
        };
        self.depth -= 1;
        result
    }

    /// Write `value` to an identifier, member or index target
    fn store(&mut self, target: &Expr, value: Value, scope: &Scope) -> Result<(), ScriptError> {
        match target {
            Expr::Ident(name) => {
                self.assign_var(scope, name, value);
                Ok(())
            }
            Expr::Member(object, name) => {
                let object = self.eval(object, scope)?;
                set_index(&object, &Value::str(name), value, &self.limits)
            }
            Expr::Index(object, key) => {
                let object = self.eval(object, scope)?;
                let key = self.eval(key, scope)?;
                set_index(&object, &key, value, &self.limits)
            }
            _ => Err(ScriptError::runtime("invalid assignment target")),
        }
    }
}

// ============================================================================
// OPERATORS AND PROPERTY ACCESS
// ============================================================================

fn is_stringish(value: &Value) -> bool {
    matches!(value, Value::Str(_) | Value::Array(_) | Value::Object(_))
}

pub(crate) fn binary(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    limits: &Limits,
) -> Result<Value, ScriptError> {
    Ok(match op {
        BinaryOp::Add => {
            if is_stringish(left) || is_stringish(right) {
                let mut text = limits.text(left)?;
                text.push_str(&limits.text(right)?);
                limits.check_string(text.len())?;
                Value::str(text)
            } else {
                Value::Number(left.to_number() + right.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Pow => Value::Number(left.to_number().powf(right.to_number())),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            let result = match ordering {
                None => false,
                Some(ord) => match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Le => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                },
            };
            Value::Bool(result)
        }
        BinaryOp::LooseEq => Value::Bool(left.loose_eq(right)),
        BinaryOp::LooseNe => Value::Bool(!left.loose_eq(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_eq(right)),
        BinaryOp::StrictNe => Value::Bool(!left.strict_eq(right)),
    })
}

/// Non-negative integral index, from a number or a numeric string
pub(crate) fn as_index(key: &Value) -> Option<usize> {
    let n = match key {
        Value::Number(n) => *n,
        Value::Str(s) => s.parse::<f64>().ok()?,
        _ => return None,
    };
    if n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64 {
        Some(n as usize)
    } else {
        None
    }
}

fn get_property(object: &Value, name: &str) -> Result<Value, ScriptError> {
    match (object, name) {
        (Value::Namespace(Namespace::Math), "PI") => Ok(Value::Number(std::f64::consts::PI)),
        (Value::Namespace(Namespace::Math), "E") => Ok(Value::Number(std::f64::consts::E)),
        _ => get_index(object, &Value::str(name)),
    }
}

pub(crate) fn get_index(object: &Value, key: &Value) -> Result<Value, ScriptError> {
    match object {
        Value::Undefined | Value::Null => Err(ScriptError::runtime(format!(
            "cannot read properties of {} (reading '{}')",
            object, key
        ))),
        Value::Array(items) => {
            let items = items.borrow();
            if let Some(i) = as_index(key) {
                return Ok(items.get(i).cloned().unwrap_or(Value::Undefined));
            }
            if key.to_key() == "length" {
                return Ok(Value::Number(items.len() as f64));
            }
            Ok(Value::Undefined)
        }
        Value::Str(s) => {
            if let Some(i) = as_index(key) {
                let c = s.chars().nth(i);
                return Ok(c.map(|c| Value::str(c.to_string())).unwrap_or(Value::Undefined));
            }
            if key.to_key() == "length" {
                return Ok(Value::Number(s.chars().count() as f64));
            }
            Ok(Value::Undefined)
        }
        Value::Object(object) => {
            Ok(object.borrow().get(&key.to_key()).cloned().unwrap_or(Value::Undefined))
        }
        _ => Ok(Value::Undefined),
    }
}

pub(crate) fn set_index(
    object: &Value,
    key: &Value,
    value: Value,
    limits: &Limits,
) -> Result<(), ScriptError> {
    match object {
        Value::Array(items) => {
            let index = as_index(key).ok_or_else(|| {
                ScriptError::runtime(format!("cannot set property '{}' on an array", key))
            })?;
            limits.check_array(index.saturating_add(1))?;
            let mut items = items.borrow_mut();
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            items[index] = value;
            Ok(())
        }
        Value::Object(object) => {
            object.borrow_mut().set(limits.text(key)?, value);
            Ok(())
        }
        other => Err(ScriptError::runtime(format!(
            "cannot set property '{}' on {}",
            key,
            other.describe()
        ))),
    }
}

/// Display form used by `console.log`
pub(crate) fn log_form(value: &Value) -> String {
    match value {
        Value::Array(_) | Value::Object(_) => crate::value::to_json(value).to_string(),
        Value::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}
