//! Failures that abandon a turn

use quboard_script::{PayloadValidationError, UserProgramError};
use quboard_solver::SolverError;
use thiserror::Error;

/// Anything that can go wrong while resolving a non-human move
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TurnFailure {
    #[error("scoring program failed: {0}")]
    UserProgram(#[from] UserProgramError),
    #[error("invalid payload: {0}")]
    Validation(#[from] PayloadValidationError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("illegal move at position {position}: {reason}")]
    IllegalMove { position: i64, reason: String },
    #[error("no legal move available")]
    NoMove,
    #[error("no turn of that kind is being resolved")]
    NotAwaiting,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_message_passes_through() {
        let err: TurnFailure = SolverError::Semantic("missing 'return' field".into()).into();
        let expected = SolverError::Semantic("missing 'return' field".into());
        assert_eq!(err.to_string(), expected.to_string());
    }

    #[test]
    fn test_program_failure_is_prefixed() {
        let err: TurnFailure = UserProgramError::EmptyProgram.into();
        assert_eq!(err.to_string(), "scoring program failed: no program code found");
    }
}
