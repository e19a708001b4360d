//! Runs a scoring program against a board snapshot
//!
//! Every run parses the text again and builds a fresh interpreter, so runs
//! share no state with each other or with the caller. The result mapping is
//! classified once into a legacy or current shape and converted into an
//! `OptimizationPayload`.

use crate::error::UserProgramError;
use crate::interp::{Interpreter, Limits};
use crate::parser::parse_program;
use crate::payload::{
    Comparator, Constraint, OptimizationPayload, VariableKind, Variables, MAX_DECLARED_NAMES,
};
use crate::value::{format_number, to_json, Object, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const ENTRY_FUNCTION: &str = "createQuboForSingleMove";

const CURRENT_KEYS: &[&str] = &[
    "variables",
    "Constraints",
    "constraints",
    "Objective",
    "objective",
    "Return",
    "returnExpression",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub step_budget: u64,
    pub max_call_depth: usize,
    pub max_string_len: usize,
    pub max_array_len: usize,
    pub entry: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            step_budget: limits.step_budget,
            max_call_depth: limits.max_call_depth,
            max_string_len: limits.max_string_len,
            max_array_len: limits.max_array_len,
            entry: ENTRY_FUNCTION.to_string(),
        }
    }
}

impl SandboxConfig {
    pub fn with_step_budget(mut self, steps: u64) -> Self {
        self.step_budget = steps;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_string_len(mut self, len: usize) -> Self {
        self.max_string_len = len;
        self
    }

    pub fn with_max_array_len(mut self, len: usize) -> Self {
        self.max_array_len = len;
        self
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = entry.into();
        self
    }

    fn limits(&self) -> Limits {
        Limits {
            step_budget: self.step_budget,
            max_call_depth: self.max_call_depth,
            max_string_len: self.max_string_len,
            max_array_len: self.max_array_len,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadShape {
    /// `{linear, quadratic}` weight dictionaries
    Legacy,
    Current,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SandboxOutcome {
    pub payload: OptimizationPayload,
    pub shape: PayloadShape,
    /// A stand-in variable was declared because the program declared none
    pub placeholder: bool,
    /// `console` output, in order
    pub trace: Vec<String>,
    pub steps: u64,
}

#[derive(Clone, Debug, Default)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn run(
        &self,
        source: &str,
        board: &serde_json::Value,
    ) -> Result<SandboxOutcome, UserProgramError> {
        if source.trim().is_empty() {
            return Err(UserProgramError::EmptyProgram);
        }
        let program = parse_program(source)?;
        if program.function(&self.config.entry).is_none() {
            return Err(UserProgramError::MissingEntry(self.config.entry.clone()));
        }

        let mut interp = Interpreter::new(self.config.limits());
        interp.load(&program)?;
        let result = interp.call_global(&self.config.entry, vec![crate::value::from_json(board)])?;
        let trace = interp.take_trace();
        let steps = interp.steps();

        let object = match result {
            Value::Object(object) => object.borrow().clone(),
            other => return Err(UserProgramError::NotAMapping(other.describe().to_string())),
        };

        let (shape, payload, placeholder) = if CURRENT_KEYS.iter().any(|k| object.contains(k)) {
            (PayloadShape::Current, ingest_current(&object)?, false)
        } else if object.contains("linear") || object.contains("quadratic") {
            let (payload, placeholder) = ingest_legacy(&object)?;
            (PayloadShape::Legacy, payload, placeholder)
        } else {
            return Err(UserProgramError::UnknownShape);
        };

        debug!(
            ?shape,
            variables = payload.variables.len(),
            constraints = payload.constraints.len(),
            steps,
            "program produced payload"
        );
        Ok(SandboxOutcome {
            payload,
            shape,
            placeholder,
            trace,
            steps,
        })
    }
}

// ============================================================================
// INGESTION
// ============================================================================

fn field(object: &Object, keys: &[&str]) -> Value {
    keys.iter()
        .find_map(|k| object.get(k).cloned())
        .unwrap_or(Value::Undefined)
}

fn is_absent(value: &Value) -> bool {
    matches!(value, Value::Undefined | Value::Null)
}

/// Every variable, and all of them together, must expand to a bounded name list
fn check_name_counts(variables: &Variables) -> Result<(), UserProgramError> {
    let too_many = |count: Option<u64>| count.map_or(true, |n| n > MAX_DECLARED_NAMES);
    for (name, kind) in variables.iter() {
        if too_many(kind.name_count()) {
            return Err(UserProgramError::BadVariable {
                name: name.clone(),
                reason: format!("expands to more than {} names", MAX_DECLARED_NAMES),
            });
        }
    }
    if too_many(variables.name_count()) {
        return Err(UserProgramError::BadField {
            field: "variables",
            reason: format!("variables expand to more than {} names", MAX_DECLARED_NAMES),
        });
    }
    Ok(())
}

/// Trailing integer of a name, `x4` -> 4
fn trailing_index(name: &str) -> Option<u64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    name[name.len() - digits..].parse().ok()
}

/// Sum of `index * selector` over every selector, in declaration order
pub fn default_return_expression(variables: &Variables) -> String {
    let terms: Vec<String> = variables
        .iter()
        .flat_map(|(name, kind)| kind.selectors(name))
        .enumerate()
        .map(|(position, name)| {
            let index = trailing_index(&name).unwrap_or(position as u64);
            format!("{} * {}", index, name)
        })
        .collect();
    terms.join(" + ")
}

fn exactly_one(variables: &Variables) -> Constraint {
    let selectors: Vec<String> =
        variables.iter().flat_map(|(name, kind)| kind.selectors(name)).collect();
    Constraint::new(selectors.join(" + "), Comparator::Eq, 1.0)
}

fn expression_field(value: Value, field: &'static str) -> Result<Option<String>, UserProgramError> {
    match value {
        Value::Undefined | Value::Null => Ok(None),
        Value::Str(s) if s.trim().is_empty() => Ok(None),
        Value::Str(s) => Ok(Some(s.to_string())),
        Value::Number(n) => Ok(Some(format_number(n))),
        other => Err(UserProgramError::BadField {
            field,
            reason: format!("expected a string, got {}", other.describe()),
        }),
    }
}

fn ingest_current(object: &Object) -> Result<OptimizationPayload, UserProgramError> {
    let variables = match field(object, &["variables"]) {
        Value::Object(vars) => {
            let vars = vars.borrow();
            let mut out = Variables::new();
            for (name, descriptor) in vars.entries() {
                let kind: VariableKind = serde_json::from_value(to_json(descriptor)).map_err(|e| {
                    UserProgramError::BadVariable {
                        name: name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                out.insert(name.clone(), kind);
            }
            out
        }
        value if is_absent(&value) => Variables::new(),
        other => {
            return Err(UserProgramError::BadField {
                field: "variables",
                reason: format!("expected a mapping, got {}", other.describe()),
            })
        }
    };
    if variables.is_empty() {
        return Err(UserProgramError::NoVariables);
    }
    check_name_counts(&variables)?;

    let mut constraints = match field(object, &["Constraints", "constraints"]) {
        Value::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(index, item)| constraint_entry(index, item))
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };
    if constraints.is_empty() {
        constraints.push(exactly_one(&variables));
    }

    let objective = expression_field(field(object, &["Objective", "objective"]), "Objective")?
        .unwrap_or_else(|| "0".to_string());
    let return_expression =
        expression_field(field(object, &["Return", "returnExpression"]), "Return")?
            .unwrap_or_else(|| default_return_expression(&variables));

    Ok(OptimizationPayload {
        variables,
        constraints,
        objective,
        return_expression,
    })
}

fn constraint_entry(index: usize, item: &Value) -> Result<Constraint, UserProgramError> {
    let bad = |reason: String| UserProgramError::BadConstraint { index, reason };
    let Value::Object(entry) = item else {
        return Err(bad(format!("expected a mapping, got {}", item.describe())));
    };
    let entry = entry.borrow();
    let lhs = match field(&entry, &["lhs"]) {
        Value::Str(s) => s.to_string(),
        Value::Number(n) => format_number(n),
        other => return Err(bad(format!("lhs must be a string, got {}", other.describe()))),
    };
    let comparison = match field(&entry, &["comparison"]) {
        value if is_absent(&value) => Comparator::Eq,
        Value::Str(s) => {
            Comparator::parse(&s).ok_or_else(|| bad(format!("unknown comparison '{}'", s)))?
        }
        other => return Err(bad(format!("comparison must be a string, got {}", other.describe()))),
    };
    let rhs = match field(&entry, &["rhs"]) {
        Value::Number(n) => n,
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| bad(format!("rhs '{}' is not a number", s)))?,
        other => return Err(bad(format!("rhs must be a number, got {}", other.describe()))),
    };
    Ok(Constraint::new(lhs, comparison, rhs))
}

/// `3` -> `x3`, anything else verbatim
fn legacy_name(key: &str) -> String {
    let key = key.trim();
    if !key.is_empty() && key.chars().all(|c| c.is_ascii_digit()) {
        format!("x{}", key)
    } else {
        key.to_string()
    }
}

fn legacy_weight(value: &Value, field: &'static str, key: &str) -> Result<f64, UserProgramError> {
    let weight = value.to_number();
    if weight.is_finite() {
        Ok(weight)
    } else {
        Err(UserProgramError::BadField {
            field,
            reason: format!("weight for '{}' is not a number", key),
        })
    }
}

fn ingest_legacy(object: &Object) -> Result<(OptimizationPayload, bool), UserProgramError> {
    let mut variables = Variables::new();
    let mut terms = Vec::new();

    if let Value::Object(linear) = field(object, &["linear"]) {
        for (key, weight) in linear.borrow().entries() {
            let name = legacy_name(key);
            let weight = legacy_weight(weight, "linear", key)?;
            variables.insert(name.clone(), VariableKind::Binary);
            if weight != 0.0 {
                terms.push(format!("{} * {}", format_number(weight), name));
            }
        }
    }

    if let Value::Object(quadratic) = field(object, &["quadratic"]) {
        for (key, weight) in quadratic.borrow().entries() {
            let Some((a, b)) = key.split_once(',') else {
                return Err(UserProgramError::BadField {
                    field: "quadratic",
                    reason: format!("key '{}' is not an 'a,b' pair", key),
                });
            };
            let (a, b) = (legacy_name(a), legacy_name(b));
            let weight = legacy_weight(weight, "quadratic", key)?;
            for name in [&a, &b] {
                if variables.get(name).is_none() {
                    variables.insert(name.clone(), VariableKind::Binary);
                }
            }
            if weight != 0.0 {
                terms.push(format!("{} * {} * {}", format_number(weight), a, b));
            }
        }
    }

    check_name_counts(&variables)?;
    let mut constraints = Vec::new();
    let placeholder = variables.is_empty();
    if placeholder {
        variables.insert("x0".to_string(), VariableKind::Binary);
    } else {
        let names: Vec<&str> = variables.names().collect();
        constraints.push(Constraint::new(names.join(" + "), Comparator::Eq, 1.0));
    }

    let objective = if terms.is_empty() { "0".to_string() } else { terms.join(" + ") };
    let return_expression = default_return_expression(&variables);
    Ok((
        OptimizationPayload {
            variables,
            constraints,
            objective,
            return_expression,
        },
        placeholder,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptError;
    use crate::expr::PolyExpr;
    use serde_json::json;
    use std::collections::HashMap;

    fn run(source: &str) -> Result<SandboxOutcome, UserProgramError> {
        Sandbox::default().run(source, &json!({"cells": ["", "", ""]}))
    }

    #[test]
    fn test_empty_program() {
        assert_eq!(run("  \n "), Err(UserProgramError::EmptyProgram));
    }

    #[test]
    fn test_missing_entry() {
        assert_eq!(
            run("function other() { return {}; }"),
            Err(UserProgramError::MissingEntry(ENTRY_FUNCTION.into()))
        );
    }

    #[test]
    fn test_non_mapping_result() {
        let err = run("function createQuboForSingleMove(board) { return 3; }").unwrap_err();
        assert_eq!(err, UserProgramError::NotAMapping("a number".into()));
    }

    #[test]
    fn test_runtime_error_is_user_error() {
        let src = "function createQuboForSingleMove(board) { return board.nope.deeper; }";
        let err = run(src).unwrap_err();
        assert!(matches!(err, UserProgramError::Script(ScriptError::Runtime(_))));
    }

    #[test]
    fn test_current_shape_fills_defaults() {
        let src = r#"
            function createQuboForSingleMove(board) {
                const variables = {};
                variables["x4"] = { "type": "Binary" };
                variables["x1"] = { "type": "Binary" };
                return { variables: variables };
            }
        "#;
        let outcome = run(src).unwrap();
        assert_eq!(outcome.shape, PayloadShape::Current);
        let expected = vec![Constraint::new("x4 + x1", Comparator::Eq, 1.0)];
        assert_eq!(outcome.payload.constraints, expected);
        assert_eq!(outcome.payload.objective, "0");
        assert_eq!(outcome.payload.return_expression, "4 * x4 + 1 * x1");
    }

    #[test]
    fn test_current_shape_without_variables() {
        let src = "function createQuboForSingleMove(board) { return { Objective: 'x1' }; }";
        assert_eq!(run(src), Err(UserProgramError::NoVariables));
    }

    #[test]
    fn test_bad_constraint_entry_is_named() {
        let src = r#"
            function createQuboForSingleMove(board) {
                return {
                    variables: { x0: { type: "Binary" } },
                    Constraints: [{ lhs: "x0", rhs: 1 }, { lhs: "x0", comparison: "<>", rhs: 1 }],
                };
            }
        "#;
        assert!(matches!(run(src), Err(UserProgramError::BadConstraint { index: 1, .. })));
    }

    #[test]
    fn test_legacy_shape_converts() {
        let src = r#"
            function createQuboForSingleMove(board) {
                const linear = {};
                linear[0] = 0;
                linear[2] = -5;
                const quadratic = {};
                quadratic["0,2"] = 3;
                return { linear: linear, quadratic: quadratic };
            }
        "#;
        let outcome = run(src).unwrap();
        assert_eq!(outcome.shape, PayloadShape::Legacy);
        assert!(!outcome.placeholder);
        let p = outcome.payload;
        assert_eq!(p.variables.names().collect::<Vec<_>>(), vec!["x0", "x2"]);
        assert_eq!(p.objective, "-5 * x2 + 3 * x0 * x2");
        assert_eq!(p.constraints, vec![Constraint::new("x0 + x2", Comparator::Eq, 1.0)]);
        assert_eq!(p.return_expression, "0 * x0 + 2 * x2");
    }

    #[test]
    fn test_legacy_single_zero_index() {
        let src = "function createQuboForSingleMove(b) { return { linear: { 0: 5 } }; }";
        let outcome = run(src).unwrap();
        assert_eq!(outcome.payload.return_expression, "0 * x0");
        assert!(!outcome.placeholder);

        let chosen: HashMap<String, f64> = [("x0".to_string(), 1.0)].into_iter().collect();
        let position = PolyExpr::parse(&outcome.payload.return_expression)
            .unwrap()
            .evaluate(&chosen)
            .unwrap();
        assert_eq!(position, 0.0);
    }

    #[test]
    fn test_oversized_declarations_rejected_before_expansion() {
        let wide = r#"function createQuboForSingleMove(b) {
            return { variables: { n: { type: "Unary", lower: -9e18, upper: 9e18 } } };
        }"#;
        let err = run(wide).unwrap_err();
        assert!(matches!(err, UserProgramError::BadVariable { ref name, .. } if name == "n"));

        let grid = r#"function createQuboForSingleMove(b) {
            return { variables: { g: { type: "Array", shape: [100000, 100000] } } };
        }"#;
        assert!(matches!(run(grid), Err(UserProgramError::BadVariable { .. })));

        let many = r#"function createQuboForSingleMove(b) {
            return { variables: {
                a: { type: "Array", shape: 60000 },
                c: { type: "Array", shape: 60000 }
            } };
        }"#;
        assert!(matches!(run(many), Err(UserProgramError::BadField { field: "variables", .. })));
    }

    #[test]
    fn test_cyclic_array_in_objective_is_not_fatal() {
        let src = r#"function createQuboForSingleMove(b) {
            const a = [];
            a.push(a);
            return { variables: { x0: { type: "Binary" } }, Objective: "" + a };
        }"#;
        let outcome = run(src).unwrap();
        assert_eq!(outcome.payload.objective, "0");
    }

    #[test]
    fn test_legacy_empty_gets_placeholder() {
        let src = "function createQuboForSingleMove(b) { return { linear: {} }; }";
        let outcome = run(src).unwrap();
        assert!(outcome.placeholder);
        assert_eq!(outcome.payload.return_expression, "0 * x0");
        assert!(outcome.payload.constraints.is_empty());
    }

    #[test]
    fn test_unknown_shape() {
        let src = "function createQuboForSingleMove(b) { return { hello: 1 }; }";
        assert_eq!(run(src), Err(UserProgramError::UnknownShape));
    }

    #[test]
    fn test_board_is_a_copy() {
        let board = json!({"cells": [""]});
        let src = "function createQuboForSingleMove(board) { \
                   board.cells[0] = 'X'; return { linear: {} }; }";
        Sandbox::default().run(src, &board).unwrap();
        assert_eq!(board, json!({"cells": [""]}));
    }

    #[test]
    fn test_trace_and_budget() {
        let src =
            "function createQuboForSingleMove(b) { console.log('hi', 2); return { linear: {} }; }";
        let outcome = run(src).unwrap();
        assert_eq!(outcome.trace, vec!["hi 2".to_string()]);
        assert!(outcome.steps > 0);

        let spin = "function createQuboForSingleMove(b) { while (true) {} }";
        let tight = Sandbox::new(SandboxConfig::default().with_step_budget(1_000));
        assert_eq!(
            tight.run(spin, &json!({})),
            Err(UserProgramError::Script(ScriptError::StepBudget(1_000)))
        );
    }

    #[test]
    fn test_default_return_uses_position_without_suffix() {
        let mut vars = Variables::new();
        vars.insert("left".into(), VariableKind::Binary);
        vars.insert("x7".into(), VariableKind::Binary);
        vars.insert("right".into(), VariableKind::Binary);
        assert_eq!(default_return_expression(&vars), "0 * left + 7 * x7 + 2 * right");
    }
}
