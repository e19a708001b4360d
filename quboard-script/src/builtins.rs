//! Standard library available to scoring programs
//!
//! Covers the subset of Math, Object, JSON, console, Array and String
//! behavior that board-scoring programs lean on. `Math.random` is absent on
//! purpose: a run must be a pure function of the program and the board.

use crate::error::ScriptError;
use crate::interp::{as_index, log_form, Interpreter, Limits};
use crate::value::{format_number, from_json, to_json, Builtin, Namespace, Value};
use std::rc::Rc;

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn num_arg(args: &[Value], i: usize) -> f64 {
    arg(args, i).to_number()
}

/// Relative index as used by `slice` and friends
fn clamp_index(raw: Value, len: usize, default: usize) -> usize {
    if matches!(raw, Value::Undefined) {
        return default;
    }
    let n = raw.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn parse_int(text: &str) -> f64 {
    let t = text.trim();
    let (negative, digits) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    match digits[..end].parse::<f64>() {
        Ok(n) if negative => -n,
        Ok(n) => n,
        Err(_) => f64::NAN,
    }
}

fn parse_float(text: &str) -> f64 {
    let t = text.trim();
    let mut end = 0;
    for i in (1..=t.len()).rev() {
        if t.is_char_boundary(i) && t[..i].parse::<f64>().is_ok() {
            end = i;
            break;
        }
    }
    if end == 0 {
        f64::NAN
    } else {
        t[..end].parse().unwrap_or(f64::NAN)
    }
}

pub(crate) fn call_builtin(
    builtin: Builtin,
    args: &[Value],
    limits: &Limits,
) -> Result<Value, ScriptError> {
    Ok(match builtin {
        Builtin::ParseInt => Value::Number(parse_int(&limits.text(&arg(args, 0))?)),
        Builtin::ParseFloat => Value::Number(parse_float(&limits.text(&arg(args, 0))?)),
        Builtin::String => match args.first() {
            Some(value) => Value::str(limits.text(value)?),
            None => Value::str(""),
        },
        Builtin::Number => Value::Number(args.first().map(Value::to_number).unwrap_or(0.0)),
        Builtin::IsNaN => Value::Bool(num_arg(args, 0).is_nan()),
    })
}

impl Interpreter {
    pub(crate) fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        match &receiver {
            Value::Namespace(ns) => self.namespace_call(*ns, name, args),
            Value::Array(_) => self.array_method(&receiver, name, args),
            Value::Str(s) => string_method(s, name, &args, self.limits()),
            Value::Number(n) => number_method(*n, name, &args),
            Value::Object(object) => match name {
                "hasOwnProperty" => {
                    Ok(Value::Bool(object.borrow().contains(&arg(&args, 0).to_key())))
                }
                "update" => {
                    if let Value::Object(other) = arg(&args, 0) {
                        let entries = other.borrow().entries().to_vec();
                        let mut target = object.borrow_mut();
                        for (k, v) in entries {
                            target.set(k, v);
                        }
                    }
                    Ok(Value::Undefined)
                }
                _ => Err(ScriptError::runtime(format!("{} is not a function", name))),
            },
            Value::Undefined | Value::Null => Err(ScriptError::runtime(format!(
                "cannot read properties of {} (reading '{}')",
                receiver, name
            ))),
            _ => Err(ScriptError::runtime(format!("{} is not a function", name))),
        }
    }

    fn namespace_call(
        &mut self,
        ns: Namespace,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let unknown =
            || ScriptError::runtime(format!("{}.{} is not a function", namespace_name(ns), name));
        match ns {
            Namespace::Math => {
                let x = num_arg(&args, 0);
                let n = match name {
                    "abs" => x.abs(),
                    "floor" => x.floor(),
                    "ceil" => x.ceil(),
                    "round" => (x + 0.5).floor(),
                    "sqrt" => x.sqrt(),
                    "trunc" => x.trunc(),
                    "sign" => {
                        if x.is_nan() || x == 0.0 {
                            x
                        } else {
                            x.signum()
                        }
                    }
                    "pow" => x.powf(num_arg(&args, 1)),
                    "min" => args.iter().map(Value::to_number).fold(f64::INFINITY, |a, b| {
                        if a.is_nan() || b.is_nan() {
                            f64::NAN
                        } else {
                            a.min(b)
                        }
                    }),
                    "max" => args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |a, b| {
                        if a.is_nan() || b.is_nan() {
                            f64::NAN
                        } else {
                            a.max(b)
                        }
                    }),
                    "random" => return Err(ScriptError::runtime("Math.random is not available")),
                    _ => return Err(unknown()),
                };
                Ok(Value::Number(n))
            }
            Namespace::Object => {
                let entries = match arg(&args, 0) {
                    Value::Object(object) => object.borrow().entries().to_vec(),
                    Value::Array(items) => items
                        .borrow()
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v.clone()))
                        .collect(),
                    _ => Vec::new(),
                };
                match name {
                    "keys" => {
                        Ok(Value::array(entries.into_iter().map(|(k, _)| Value::str(k)).collect()))
                    }
                    "values" => Ok(Value::array(entries.into_iter().map(|(_, v)| v).collect())),
                    "entries" => Ok(Value::array(
                        entries
                            .into_iter()
                            .map(|(k, v)| Value::array(vec![Value::str(k), v]))
                            .collect(),
                    )),
                    "assign" => {
                        let target = arg(&args, 0);
                        if let Value::Object(target) = &target {
                            for source in args.iter().skip(1) {
                                if let Value::Object(source) = source {
                                    let pairs = source.borrow().entries().to_vec();
                                    let mut target = target.borrow_mut();
                                    for (k, v) in pairs {
                                        target.set(k, v);
                                    }
                                }
                            }
                        }
                        Ok(target)
                    }
                    _ => Err(unknown()),
                }
            }
            Namespace::Console => match name {
                "log" | "info" | "warn" | "error" | "debug" => {
                    let line: Vec<String> = args.iter().map(log_form).collect();
                    let line = line.join(" ");
                    self.limits().check_string(line.len())?;
                    self.log(line);
                    Ok(Value::Undefined)
                }
                _ => Err(unknown()),
            },
            Namespace::Json => match name {
                "stringify" => Ok(match arg(&args, 0) {
                    Value::Undefined | Value::Function(_) | Value::Builtin(_) => Value::Undefined,
                    value => {
                        let text = to_json(&value).to_string();
                        self.limits().check_string(text.len())?;
                        Value::str(text)
                    }
                }),
                "parse" => {
                    let text = self.limits().text(&arg(&args, 0))?;
                    let json: serde_json::Value = serde_json::from_str(&text)
                        .map_err(|e| ScriptError::runtime(format!("JSON.parse: {}", e)))?;
                    Ok(from_json(&json))
                }
                _ => Err(unknown()),
            },
            Namespace::Array => match name {
                "isArray" => Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_)))),
                _ => Err(unknown()),
            },
        }
    }

    fn array_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let Value::Array(items) = receiver else {
            return Err(ScriptError::runtime(format!("{} is not a function", name)));
        };
        let limits = *self.limits();
        match name {
            "push" => {
                let mut items = items.borrow_mut();
                limits.check_array(items.len().saturating_add(args.len()))?;
                items.extend(args);
                Ok(Value::Number(items.len() as f64))
            }
            "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
            "shift" => {
                let mut items = items.borrow_mut();
                if items.is_empty() {
                    Ok(Value::Undefined)
                } else {
                    Ok(items.remove(0))
                }
            }
            "join" => {
                let sep = match arg(&args, 0) {
                    Value::Undefined => ",".to_string(),
                    other => limits.text(&other)?,
                };
                let mut out = String::new();
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(&sep);
                    }
                    if !matches!(item, Value::Undefined | Value::Null) {
                        out.push_str(&limits.text(item)?);
                    }
                    limits.check_string(out.len())?;
                }
                Ok(Value::str(out))
            }
            "includes" => {
                let needle = arg(&args, 0);
                Ok(Value::Bool(items.borrow().iter().any(|v| v.strict_eq(&needle))))
            }
            "indexOf" => {
                let needle = arg(&args, 0);
                let found = items.borrow().iter().position(|v| v.strict_eq(&needle));
                Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
            }
            "slice" => {
                let items = items.borrow();
                let start = clamp_index(arg(&args, 0), items.len(), 0);
                let end = clamp_index(arg(&args, 1), items.len(), items.len());
                Ok(Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() }))
            }
            "concat" => {
                let mut out = items.borrow().clone();
                for a in args {
                    match a {
                        Value::Array(more) => {
                            let more = more.borrow();
                            limits.check_array(out.len().saturating_add(more.len()))?;
                            out.extend(more.iter().cloned());
                        }
                        other => {
                            limits.check_array(out.len() + 1)?;
                            out.push(other);
                        }
                    }
                }
                Ok(Value::array(out))
            }
            "reverse" => {
                items.borrow_mut().reverse();
                Ok(receiver.clone())
            }
            "forEach" | "map" | "filter" | "some" | "every" | "find" | "findIndex" => {
                let callback = arg(&args, 0);
                let snapshot = items.borrow().clone();
                let mut mapped = Vec::new();
                for (i, item) in snapshot.into_iter().enumerate() {
                    let result = self.call_value(
                        &callback,
                        vec![item.clone(), Value::Number(i as f64), receiver.clone()],
                    )?;
                    match name {
                        "map" => mapped.push(result),
                        "filter" if result.truthy() => mapped.push(item),
                        "some" if result.truthy() => return Ok(Value::Bool(true)),
                        "every" if !result.truthy() => return Ok(Value::Bool(false)),
                        "find" if result.truthy() => return Ok(item),
                        "findIndex" if result.truthy() => return Ok(Value::Number(i as f64)),
                        _ => {}
                    }
                }
                Ok(match name {
                    "map" | "filter" => Value::array(mapped),
                    "some" => Value::Bool(false),
                    "every" => Value::Bool(true),
                    "findIndex" => Value::Number(-1.0),
                    _ => Value::Undefined,
                })
            }
            "reduce" => {
                let callback = arg(&args, 0);
                let snapshot = items.borrow().clone();
                let mut iter = snapshot.into_iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first,
                        None => {
                            let message = "reduce of empty array with no initial value";
                            return Err(ScriptError::runtime(message));
                        }
                    },
                };
                for (i, item) in iter {
                    let call_args = vec![acc, item, Value::Number(i as f64), receiver.clone()];
                    acc = self.call_value(&callback, call_args)?;
                }
                Ok(acc)
            }
            _ => Err(ScriptError::runtime(format!("{} is not a function", name))),
        }
    }
}

fn namespace_name(ns: Namespace) -> &'static str {
    match ns {
        Namespace::Math => "Math",
        Namespace::Object => "Object",
        Namespace::Console => "console",
        Namespace::Json => "JSON",
        Namespace::Array => "Array",
    }
}

/// Length of `s` with `count` matches of `pattern` swapped for `replacement`
fn replaced_len(s: &str, pattern: &str, replacement: &str, count: usize) -> usize {
    s.len()
        .saturating_sub(count.saturating_mul(pattern.len()))
        .saturating_add(count.saturating_mul(replacement.len()))
}

fn string_method(
    s: &Rc<str>,
    name: &str,
    args: &[Value],
    limits: &Limits,
) -> Result<Value, ScriptError> {
    let text = limits.text(&arg(args, 0))?;
    let chars: Vec<char> = s.chars().collect();
    let value = match name {
        "replace" | "replaceAll" => {
            let replacement = limits.text(&arg(args, 1))?;
            let count = if name == "replace" {
                usize::from(s.contains(text.as_str()))
            } else if text.is_empty() {
                chars.len() + 1
            } else {
                s.matches(text.as_str()).count()
            };
            limits.check_string(replaced_len(s, &text, &replacement, count))?;
            Value::str(s.replacen(text.as_str(), &replacement, count))
        }
        "startsWith" => Value::Bool(s.starts_with(&text)),
        "endsWith" => Value::Bool(s.ends_with(&text)),
        "includes" => Value::Bool(s.contains(&text)),
        "indexOf" => Value::Number(
            s.find(&text)
                .map(|byte| s[..byte].chars().count() as f64)
                .unwrap_or(-1.0),
        ),
        "trim" => Value::str(s.trim()),
        "toUpperCase" | "toLowerCase" => {
            let out = if name == "toUpperCase" { s.to_uppercase() } else { s.to_lowercase() };
            limits.check_string(out.len())?;
            Value::str(out)
        }
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Undefined => vec![Value::str(s)],
                _ if text.is_empty() => {
                    limits.check_array(chars.len())?;
                    chars.iter().map(|c| Value::str(c.to_string())).collect()
                }
                _ => {
                    limits.check_array(s.matches(text.as_str()).count().saturating_add(1))?;
                    s.split(text.as_str()).map(Value::str).collect()
                }
            };
            Value::array(parts)
        }
        "charAt" => {
            let i = as_index(&arg(args, 0)).unwrap_or(0);
            Value::str(chars.get(i).map(|c| c.to_string()).unwrap_or_default())
        }
        "substring" => {
            let clamp = |v: Value, default: usize| -> usize {
                if matches!(v, Value::Undefined) {
                    return default;
                }
                let n = v.to_number();
                if n.is_nan() || n < 0.0 {
                    0
                } else {
                    (n as usize).min(chars.len())
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), chars.len());
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            Value::str(chars[lo..hi].iter().collect::<String>())
        }
        "slice" => {
            let start = clamp_index(arg(args, 0), chars.len(), 0);
            let end = clamp_index(arg(args, 1), chars.len(), chars.len());
            let out: String = if start < end {
                chars[start..end].iter().collect()
            } else {
                String::new()
            };
            Value::str(out)
        }
        _ => return Err(ScriptError::runtime(format!("{} is not a function", name))),
    };
    Ok(value)
}

fn number_method(n: f64, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match name {
        "toFixed" => {
            let digits = as_index(&arg(args, 0)).unwrap_or(0).min(20);
            Ok(Value::str(format!("{:.*}", digits, n)))
        }
        "toString" => Ok(Value::str(format_number(n))),
        _ => Err(ScriptError::runtime(format!("{} is not a function", name))),
    }
}
