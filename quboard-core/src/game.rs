//! Shared game vocabulary: marks, move effects, and the `Game` trait

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Player identity. `First` always opens a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    First = 0,
    Second = 1,
}

impl Mark {
    pub fn opponent(self) -> Self {
        match self {
            Mark::First => Mark::Second,
            Mark::Second => Mark::First,
        }
    }

    /// Symbol used in placement-game snapshots
    pub fn symbol(self) -> &'static str {
        match self {
            Mark::First => "X",
            Mark::Second => "O",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::First => write!(f, "player 1 ({})", self.symbol()),
            Mark::Second => write!(f, "player 2 ({})", self.symbol()),
        }
    }
}

/// Which of the three games a board belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    TicTacToe,
    ConnectFour,
    Mancala,
}

impl GameKind {
    pub const ALL: [GameKind; 3] = [GameKind::TicTacToe, GameKind::ConnectFour, GameKind::Mancala];

    /// Stable short name, used for snapshot file names
    pub fn slug(self) -> &'static str {
        match self {
            GameKind::TicTacToe => "tictactoe",
            GameKind::ConnectFour => "connect4",
            GameKind::Mancala => "mancala",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// What an accepted move did to the board
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEffect {
    /// Cell (placement games) or virtual slot (sowing game) that received the last piece
    pub landed: usize,
    /// Mover keeps the turn
    pub extra_turn: bool,
    /// Seeds moved to the store by a capture
    pub captured: u32,
}

/// Why a move was rejected. The board is never mutated when this is returned.
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IllegalMove {
    #[error("position {0} is out of range")]
    OutOfRange(usize),
    #[error("cell {0} is already occupied")]
    Occupied(usize),
    #[error("column {0} is full")]
    ColumnFull(usize),
    #[error("pit {0} is empty")]
    EmptyPit(usize),
    #[error("the game is already over")]
    GameOver,
}

/// Final state of a round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Ongoing,
    Win(Mark),
    Draw,
}

// ============================================================================
// GAME TRAIT
// ============================================================================

/// Rules of one turn-based board game.
///
/// Positions are plain indexes whose meaning is game specific: a cell for
/// tic-tac-toe, a column for connect-four, a pit on the mover's row for mancala.
pub trait Game: Clone + fmt::Debug + Default + Serialize + DeserializeOwned + Send + 'static {
    const KIND: GameKind;

    /// Apply `mover`'s move at `position`. Mutates only on success.
    fn apply_move(&mut self, position: usize, mover: Mark) -> Result<MoveEffect, IllegalMove>;

    fn is_win(&self, mover: Mark) -> bool;

    fn is_draw(&self) -> bool;

    /// Positions `mover` may play, in ascending position order
    fn legal_positions(&self, mover: Mark) -> Vec<usize>;

    /// Board view handed to scoring programs
    fn snapshot(&self) -> serde_json::Value;

    /// Text view for terminal play
    fn render(&self) -> String;

    /// Fallback order for the strategic opponent, best first
    fn preference_order() -> &'static [usize];

    /// Would playing `position` stop the opponent of `mover` from winning next turn?
    fn blocks(&self, position: usize, mover: Mark) -> bool {
        let opponent = mover.opponent();
        let mut trial = self.clone();
        trial.apply_move(position, opponent).is_ok() && trial.is_win(opponent)
    }

    fn outcome(&self) -> Outcome {
        if self.is_win(Mark::First) {
            Outcome::Win(Mark::First)
        } else if self.is_win(Mark::Second) {
            Outcome::Win(Mark::Second)
        } else if self.is_draw() {
            Outcome::Draw
        } else {
            Outcome::Ongoing
        }
    }

    fn is_over(&self) -> bool {
        self.outcome() != Outcome::Ongoing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_opponent() {
        assert_eq!(Mark::First.opponent(), Mark::Second);
        assert_eq!(Mark::Second.opponent(), Mark::First);
    }

    #[test]
    fn test_kind_slugs_unique() {
        let slugs: std::collections::HashSet<_> = GameKind::ALL.iter().map(|k| k.slug()).collect();
        assert_eq!(slugs.len(), 3);
    }

    #[test]
    fn test_kind_serde_snake_case() {
        let json = serde_json::to_string(&GameKind::ConnectFour).unwrap();
        assert_eq!(json, "\"connect_four\"");
    }
}
