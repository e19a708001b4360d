//! QUBOARD scoring programs
//!
//! Interprets the JavaScript-like programs emitted by the visual block
//! editor, turns their result into an [`OptimizationPayload`], and validates
//! payloads before they go to the solver.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod expr;
pub mod interp;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod payload;
pub mod sandbox;
pub mod value;

pub use error::{PayloadField, PayloadValidationError, ScriptError, UserProgramError};
pub use expr::PolyExpr;
pub use interp::{Interpreter, Limits};
pub use normalize::{normalize, normalize_str};
pub use payload::{
    Comparator, Constraint, ElementType, OptimizationPayload, Shape, VariableKind, Variables,
    MAX_DECLARED_NAMES,
};
pub use sandbox::{
    default_return_expression, PayloadShape, Sandbox, SandboxConfig, SandboxOutcome, ENTRY_FUNCTION,
};
