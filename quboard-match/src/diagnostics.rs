//! Append-only diagnostic stream for the presentation layer

use quboard_core::GameKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}

/// Entries are mirrored into `tracing` as they are pushed
#[derive(Clone, Debug)]
pub struct DiagnosticLog {
    game: GameKind,
    entries: Vec<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new(game: GameKind) -> Self {
        Self {
            game,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::Info => info!(game = %self.game, "{}", message),
            Level::Warn => warn!(game = %self.game, "{}", message),
            Level::Error => error!(game = %self.game, "{}", message),
        }
        self.entries.push(Diagnostic { level, message });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Hand over everything pushed since the last drain
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_empties() {
        let mut log = DiagnosticLog::new(GameKind::TicTacToe);
        log.info("round 1");
        log.error("boom");
        assert_eq!(log.entries().len(), 2);
        let drained = log.drain();
        assert_eq!(drained[1].level, Level::Error);
        assert_eq!(drained[1].to_string(), "[error] boom");
        assert!(log.entries().is_empty());
    }
}
