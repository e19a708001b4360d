//! Solver failure kinds

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// No usable response: connection refused, timeout, broken body
    #[error("Server did not respond. Is the server running? ({0})")]
    Transport(String),
    /// Non-success status or an `error` field in the reply
    #[error("Server error: {message}")]
    Server { status: Option<u16>, message: String },
    /// The reply did not carry a usable position
    #[error("unusable solver reply: {0}")]
    Semantic(String),
}
