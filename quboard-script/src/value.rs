//! Runtime values with reference semantics for arrays and objects

use crate::ast::FunctionDef;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type ArrayRef = Rc<RefCell<Vec<Value>>>;
pub type ObjectRef = Rc<RefCell<Object>>;
pub type Scope = Rc<RefCell<Frame>>;

/// One lexical scope
#[derive(Debug, Default)]
pub struct Frame {
    pub vars: FxHashMap<String, Value>,
    pub parent: Option<Scope>,
}

impl Frame {
    pub fn child(parent: &Scope) -> Scope {
        Rc::new(RefCell::new(Frame {
            vars: FxHashMap::default(),
            parent: Some(Rc::clone(parent)),
        }))
    }
}

/// Insertion-ordered property map
#[derive(Debug, Default, Clone)]
pub struct Object {
    entries: Vec<(String, Value)>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: String, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// User function plus the scope it closes over
#[derive(Debug)]
pub struct Closure {
    pub def: Rc<FunctionDef>,
    pub scope: Scope,
}

/// Global functions callable as values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    ParseInt,
    ParseFloat,
    String,
    Number,
    IsNaN,
}

/// Global namespaces whose members are builtins
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    Math,
    Object,
    Console,
    Json,
    Array,
}

#[derive(Clone, Debug)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Rc<Closure>),
    Builtin(Builtin),
    Namespace(Namespace),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(object: Object) -> Self {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::Namespace(_) => "object",
            Value::Function(_) | Value::Builtin(_) => "function",
        }
    }

    /// Short description for error messages
    pub fn describe(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::Str(_) => "a string",
            Value::Array(_) => "an array",
            Value::Object(_) | Value::Namespace(_) => "an object",
            Value::Function(_) | Value::Builtin(_) => "a function",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::Str(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) => {
                let items = items.borrow();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// Property key form of a value
    pub fn to_key(&self) -> String {
        self.to_string()
    }

    /// `===`
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Namespace(a), Value::Namespace(b)) => a == b,
            _ => false,
        }
    }

    /// `==`
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Number(_), Value::Str(_))
            | (Value::Str(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_eq(other),
        }
    }
}

/// Number formatting that prints integral values without a fraction
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Arrays nested deeper than this render as empty text
const MAX_RENDER_DEPTH: usize = 64;

/// Upper bound on the text `Display` produces for one array
pub const MAX_RENDER_LEN: usize = 1 << 22;

type ArrayPtr = *const RefCell<Vec<Value>>;

impl Value {
    /// String form, stopping once the text passes `limit` bytes
    ///
    /// A cyclic reference renders as the empty string, as `join` does.
    pub fn render(&self, limit: usize) -> String {
        let mut out = String::new();
        render_into(self, limit, &mut out, &mut Vec::new());
        out
    }
}

fn render_into(value: &Value, limit: usize, out: &mut String, open: &mut Vec<ArrayPtr>) {
    match value {
        Value::Str(s) => out.push_str(s),
        Value::Array(items) => {
            let ptr = Rc::as_ptr(items);
            if open.len() >= MAX_RENDER_DEPTH || open.contains(&ptr) {
                return;
            }
            open.push(ptr);
            for (i, item) in items.borrow().iter().enumerate() {
                if out.len() > limit {
                    break;
                }
                if i > 0 {
                    out.push(',');
                }
                if !matches!(item, Value::Undefined | Value::Null) {
                    render_into(item, limit, out, open);
                }
            }
            open.pop();
        }
        other => {
            use fmt::Write;
            let _ = write!(out, "{}", other);
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Array(_) => f.write_str(&self.render(MAX_RENDER_LEN)),
            Value::Object(_) | Value::Namespace(_) => write!(f, "[object Object]"),
            Value::Function(c) => write!(f, "function {}()", c.def.name.as_deref().unwrap_or("")),
            Value::Builtin(b) => write!(f, "function {:?}()", b),
        }
    }
}

// ============================================================================
// JSON BRIDGE
// ============================================================================

/// Fresh runtime copy of a JSON value
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            let mut object = Object::new();
            for (k, v) in map {
                object.set(k.clone(), from_json(v));
            }
            Value::object(object)
        }
    }
}

/// JSON form of a runtime value; functions and undefined become null
///
/// Nesting past `MAX_JSON_DEPTH`, and every node after the first
/// `MAX_JSON_NODES`, also becomes null.
pub fn to_json(value: &Value) -> serde_json::Value {
    let mut budget = MAX_JSON_NODES;
    to_json_depth(value, 0, &mut budget)
}

const MAX_JSON_DEPTH: usize = 64;
const MAX_JSON_NODES: usize = 1_000_000;

fn to_json_depth(value: &Value, depth: usize, budget: &mut usize) -> serde_json::Value {
    if depth > MAX_JSON_DEPTH || *budget == 0 {
        return serde_json::Value::Null;
    }
    *budget -= 1;
    match value {
        Value::Undefined | Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                serde_json::Value::from(*n as i64)
            } else {
                serde_json::Number::from_f64(*n)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            }
        }
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::Array(items) => serde_json::Value::Array(
            items
                .borrow()
                .iter()
                .map(|v| to_json_depth(v, depth + 1, budget))
                .collect(),
        ),
        Value::Object(object) => {
            let mut map = serde_json::Map::new();
            for (k, v) in object.borrow().entries() {
                map.insert(k.clone(), to_json_depth(v, depth + 1, budget));
            }
            serde_json::Value::Object(map)
        }
        Value::Function(_) | Value::Builtin(_) | Value::Namespace(_) => serde_json::Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_format() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::str("").truthy());
        assert!(Value::str("0").truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(Value::array(vec![]).truthy());
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(Value::Number(1.0).loose_eq(&Value::str("1")));
        assert!(!Value::Number(1.0).strict_eq(&Value::str("1")));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
    }

    #[test]
    fn test_array_display_joins() {
        let v = Value::array(vec![Value::Number(1.0), Value::str("a"), Value::Null]);
        assert_eq!(v.to_string(), "1,a,");
    }

    #[test]
    fn test_cyclic_array_displays_empty_slot() {
        let a = Value::array(vec![Value::Number(1.0)]);
        if let Value::Array(items) = &a {
            items.borrow_mut().push(a.clone());
        }
        assert_eq!(a.to_string(), "1,");
        assert_eq!(to_json(&a)[1][1][0], serde_json::json!(1));
    }

    #[test]
    fn test_render_stops_past_limit() {
        let big = Value::array((0..1_000).map(|_| Value::str("abcd")).collect());
        let text = big.render(100);
        assert!(text.len() > 100 && text.len() < 120);
        assert_eq!(big.to_string().len(), 1_000 * 5 - 1);
    }

    #[test]
    fn test_deep_nesting_renders_bounded() {
        let mut v = Value::str("core");
        for _ in 0..200 {
            v = Value::array(vec![v]);
        }
        assert_eq!(v.to_string(), "");
        assert!(matches!(to_json(&v).pointer("/0/0/0"), Some(serde_json::Value::Array(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let json = serde_json::json!({"b": 1, "a": [true, "x"]});
        let back = to_json(&from_json(&json));
        assert_eq!(back, json);
    }

    #[test]
    fn test_object_set_overwrites() {
        let mut object = Object::new();
        object.set("k".into(), Value::Number(1.0));
        object.set("k".into(), Value::Number(2.0));
        assert_eq!(object.len(), 1);
        assert!(matches!(object.get("k"), Some(Value::Number(n)) if *n == 2.0));
    }
}
