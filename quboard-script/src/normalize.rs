//! Payload validation and canonicalization
//!
//! `normalize` is pure and idempotent: the output of a successful call
//! normalizes to itself.

use crate::error::{PayloadField, PayloadValidationError};
use crate::expr::PolyExpr;
use crate::payload::{
    Constraint, OptimizationPayload, Shape, VariableKind, Variables, MAX_DECLARED_NAMES,
};
use serde::Deserialize;
use std::collections::HashSet;

/// Validate a typed payload and return its canonical form
pub fn normalize(
    payload: &OptimizationPayload,
) -> Result<OptimizationPayload, PayloadValidationError> {
    if payload.variables.is_empty() {
        return Err(PayloadValidationError::Empty(PayloadField::Variables));
    }
    for (name, kind) in payload.variables.iter() {
        check_variable(name, kind)?;
    }
    if payload.variables.name_count().map_or(true, |n| n > MAX_DECLARED_NAMES) {
        return Err(PayloadValidationError::Malformed {
            field: PayloadField::Variables,
            reason: format!("variables expand to more than {} names", MAX_DECLARED_NAMES),
        });
    }

    let objective = non_blank(&payload.objective, PayloadField::Objective)?;
    let return_expression = non_blank(&payload.return_expression, PayloadField::Return)?;

    let declared: HashSet<String> = payload.variables.declared_names().into_iter().collect();
    let mut constraints = Vec::with_capacity(payload.constraints.len());
    for (i, constraint) in payload.constraints.iter().enumerate() {
        let field = PayloadField::Constraint(i);
        if !constraint.rhs.is_finite() {
            return Err(PayloadValidationError::Malformed {
                field,
                reason: "rhs must be a finite number".into(),
            });
        }
        let lhs = non_blank(&constraint.lhs, field)?;
        check_expression(&lhs, field, &declared)?;
        constraints.push(Constraint::new(lhs, constraint.comparison, constraint.rhs));
    }
    check_expression(&objective, PayloadField::Objective, &declared)?;
    check_expression(&return_expression, PayloadField::Return, &declared)?;

    Ok(OptimizationPayload {
        variables: payload.variables.clone(),
        constraints,
        objective,
        return_expression,
    })
}

fn check_variable(name: &str, kind: &VariableKind) -> Result<(), PayloadValidationError> {
    let malformed = |reason: String| PayloadValidationError::Malformed {
        field: PayloadField::Variables,
        reason,
    };
    if name.trim().is_empty() {
        return Err(malformed("variable names must not be blank".into()));
    }
    match kind {
        VariableKind::Unary { lower, upper } if lower > upper => Err(malformed(format!(
            "'{}' has lower bound {} above upper bound {}",
            name, lower, upper
        ))),
        VariableKind::Array { shape, .. } if shape.is_empty() => {
            let dims = match shape {
                Shape::Length(n) => n.to_string(),
                Shape::Grid([r, c]) => format!("{}x{}", r, c),
            };
            Err(malformed(format!("'{}' has empty shape {}", name, dims)))
        }
        _ if kind.name_count().map_or(true, |n| n > MAX_DECLARED_NAMES) => Err(malformed(format!(
            "'{}' expands to more than {} names",
            name, MAX_DECLARED_NAMES
        ))),
        _ => Ok(()),
    }
}

fn non_blank(text: &str, field: PayloadField) -> Result<String, PayloadValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(PayloadValidationError::Blank(field))
    } else {
        Ok(trimmed.to_string())
    }
}

fn check_expression(
    text: &str,
    field: PayloadField,
    declared: &HashSet<String>,
) -> Result<(), PayloadValidationError> {
    let expr = PolyExpr::parse(text).map_err(|e| PayloadValidationError::Syntax {
        field,
        message: e.to_string(),
    })?;
    match expr.variables().into_iter().find(|name| !declared.contains(name)) {
        Some(name) => Err(PayloadValidationError::UndeclaredVariable { field, name }),
        None => Ok(()),
    }
}

// ============================================================================
// LENIENT JSON INPUT
// ============================================================================

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    variables: Option<Variables>,
    #[serde(rename = "Constraints", alias = "constraints", default)]
    constraints: serde_json::Value,
    #[serde(rename = "Objective", alias = "objective", default)]
    objective: serde_json::Value,
    #[serde(rename = "Return", alias = "returnExpression", default)]
    return_expression: serde_json::Value,
}

fn text_field(
    value: &serde_json::Value,
    field: PayloadField,
) -> Result<String, PayloadValidationError> {
    match value {
        serde_json::Value::Null => Err(PayloadValidationError::Blank(field)),
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(PayloadValidationError::Malformed {
            field,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

/// Normalize payload JSON text, keeping variable declaration order
///
/// A `Constraints` value that is not a sequence is treated as empty.
pub fn normalize_str(text: &str) -> Result<OptimizationPayload, PayloadValidationError> {
    let raw: RawPayload = serde_json::from_str(text).map_err(|e| PayloadValidationError::Malformed {
        field: PayloadField::Variables,
        reason: e.to_string(),
    })?;

    let variables = raw.variables.unwrap_or_default();
    let constraints = match raw.constraints {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value::<Constraint>(item).map_err(|e| {
                    PayloadValidationError::Malformed {
                        field: PayloadField::Constraint(i),
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => Vec::new(),
    };
    let payload = OptimizationPayload {
        variables,
        constraints,
        objective: text_field(&raw.objective, PayloadField::Objective)?,
        return_expression: text_field(&raw.return_expression, PayloadField::Return)?,
    };
    normalize(&payload)
}
