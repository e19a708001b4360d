//! Error taxonomy for program execution and payload validation

use std::fmt;
use thiserror::Error;

/// Failure while lexing, parsing or interpreting program text
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("step budget of {0} exhausted")]
    StepBudget(u64),
    #[error("call depth limit of {0} exceeded")]
    CallDepth(usize),
    #[error("{what} would exceed the limit of {limit}")]
    SizeLimit { what: &'static str, limit: usize },
}

impl ScriptError {
    pub fn runtime(message: impl Into<String>) -> Self {
        ScriptError::Runtime(message.into())
    }
}

/// The user's scoring program could not produce a payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UserProgramError {
    #[error("no program code found")]
    EmptyProgram,
    #[error("function '{0}' not found")]
    MissingEntry(String),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("program must return a payload object, got {0}")]
    NotAMapping(String),
    #[error("payload has neither 'variables' nor 'linear'/'quadratic'")]
    UnknownShape,
    #[error("no variables defined")]
    NoVariables,
    #[error("invalid variable '{name}': {reason}")]
    BadVariable { name: String, reason: String },
    #[error("invalid constraint #{index}: {reason}")]
    BadConstraint { index: usize, reason: String },
    #[error("invalid {field}: {reason}")]
    BadField { field: &'static str, reason: String },
}

/// Payload field named by a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadField {
    Variables,
    Constraint(usize),
    Objective,
    Return,
}

impl fmt::Display for PayloadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadField::Variables => write!(f, "variables"),
            PayloadField::Constraint(i) => write!(f, "Constraints[{}]", i),
            PayloadField::Objective => write!(f, "Objective"),
            PayloadField::Return => write!(f, "Return"),
        }
    }
}

/// A payload violates the wire schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PayloadValidationError {
    #[error("{0} must not be empty")]
    Empty(PayloadField),
    #[error("{0} must not be blank")]
    Blank(PayloadField),
    #[error("{field}: {reason}")]
    Malformed { field: PayloadField, reason: String },
    #[error("{field}: syntax error: {message}")]
    Syntax { field: PayloadField, message: String },
    #[error("{field}: variable '{name}' is not declared")]
    UndeclaredVariable { field: PayloadField, name: String },
}

impl PayloadValidationError {
    pub fn field(&self) -> PayloadField {
        match self {
            PayloadValidationError::Empty(field) | PayloadValidationError::Blank(field) => *field,
            PayloadValidationError::Malformed { field, .. }
            | PayloadValidationError::Syntax { field, .. }
            | PayloadValidationError::UndeclaredVariable { field, .. } => *field,
        }
    }
}
