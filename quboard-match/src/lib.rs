//! QUBOARD Match - turn orchestration for a best-of-N series
//!
//! This crate ties the board, the local opponent, the scoring-program
//! sandbox and the solver client together:
//! - `Match`: the phase state machine that owns board, mover and series
//! - `MatchDriver`: async loop that resolves CPU and solver turns and
//!   streams `Update`s to a subscriber
//! - `SnapshotStore`: per-game board persistence
//! - `DiagnosticLog`: the user-visible message stream

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod series;
pub mod snapshot;
pub mod source;

pub use config::{MatchConfig, OccupiedPolicy};
pub use diagnostics::{Diagnostic, DiagnosticLog, Level};
pub use driver::{MatchDriver, Update};
pub use error::TurnFailure;
pub use orchestrator::{AfterMove, Event, Match, MoveReport, Phase, Response, TurnJob};
pub use series::MatchSeries;
pub use snapshot::{Snapshot, SnapshotStore};
pub use source::{GameMode, MoveSource};
