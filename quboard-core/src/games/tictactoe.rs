//! Three-in-a-row on a 3x3 grid

use crate::game::{Game, GameKind, IllegalMove, Mark, MoveEffect};
use serde::{Deserialize, Serialize};

pub const CELLS: usize = 9;

/// The 8 winning lines: rows, columns, diagonals
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Center, corners, then edges
const PREFERENCE: [usize; CELLS] = [4, 0, 2, 6, 8, 1, 3, 5, 7];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicTacToe {
    cells: [Option<Mark>; CELLS],
}

impl TicTacToe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from a 9-character picture, `X`/`O` for marks and anything else for empty
    pub fn from_picture(picture: &str) -> Self {
        let mut board = Self::new();
        for (i, ch) in picture.chars().filter(|c| !c.is_whitespace()).take(CELLS).enumerate() {
            board.cells[i] = match ch {
                'X' | 'x' => Some(Mark::First),
                'O' | 'o' => Some(Mark::Second),
                _ => None,
            };
        }
        board
    }

    pub fn cell(&self, index: usize) -> Option<Mark> {
        self.cells.get(index).copied().flatten()
    }

    pub fn empty_cells(&self) -> impl Iterator<Item = usize> + '_ {
        (0..CELLS).filter(|&i| self.cells[i].is_none())
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Unchecked placement used by search
    pub(crate) fn set(&mut self, index: usize, mark: Option<Mark>) {
        self.cells[index] = mark;
    }
}

impl Game for TicTacToe {
    const KIND: GameKind = GameKind::TicTacToe;

    fn apply_move(&mut self, position: usize, mover: Mark) -> Result<MoveEffect, IllegalMove> {
        if position >= CELLS {
            return Err(IllegalMove::OutOfRange(position));
        }
        if self.cells[position].is_some() {
            return Err(IllegalMove::Occupied(position));
        }
        self.cells[position] = Some(mover);
        Ok(MoveEffect {
            landed: position,
            ..MoveEffect::default()
        })
    }

    fn is_win(&self, mover: Mark) -> bool {
        LINES
            .iter()
            .any(|line| line.iter().all(|&i| self.cells[i] == Some(mover)))
    }

    fn is_draw(&self) -> bool {
        self.is_full() && !self.is_win(Mark::First) && !self.is_win(Mark::Second)
    }

    fn legal_positions(&self, _mover: Mark) -> Vec<usize> {
        if self.is_win(Mark::First) || self.is_win(Mark::Second) {
            return Vec::new();
        }
        self.empty_cells().collect()
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.cells
                .iter()
                .map(|c| serde_json::Value::from(c.map(Mark::symbol).unwrap_or("")))
                .collect(),
        )
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for row in 0..3 {
            let line: Vec<String> = (0..3)
                .map(|col| {
                    let i = row * 3 + col;
                    match self.cells[i] {
                        Some(m) => m.symbol().to_string(),
                        None => i.to_string(),
                    }
                })
                .collect();
            out.push_str(&format!(" {}\n", line.join(" | ")));
            if row < 2 {
                out.push_str("---+---+---\n");
            }
        }
        out
    }

    fn preference_order() -> &'static [usize] {
        &PREFERENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_and_occupied() {
        let mut board = TicTacToe::new();
        assert!(board.apply_move(4, Mark::First).is_ok());
        assert_eq!(board.cell(4), Some(Mark::First));
        let before = board.clone();
        assert_eq!(board.apply_move(4, Mark::Second), Err(IllegalMove::Occupied(4)));
        assert_eq!(board, before);
    }

    #[test]
    fn test_out_of_range() {
        let mut board = TicTacToe::new();
        assert_eq!(board.apply_move(9, Mark::First), Err(IllegalMove::OutOfRange(9)));
    }

    #[test]
    fn test_row_win() {
        let board = TicTacToe::from_picture("XXX OO. ...");
        assert!(board.is_win(Mark::First));
        assert!(!board.is_win(Mark::Second));
        assert!(board.legal_positions(Mark::Second).is_empty());
    }

    #[test]
    fn test_draw() {
        let board = TicTacToe::from_picture("XOX XOO OXX");
        assert!(board.is_draw());
        assert!(board.is_over());
    }

    #[test]
    fn test_snapshot_strings() {
        let board = TicTacToe::from_picture("X.. .O. ...");
        let snap = board.snapshot();
        assert_eq!(snap[0], "X");
        assert_eq!(snap[4], "O");
        assert_eq!(snap[8], "");
        assert_eq!(snap.as_array().map(Vec::len), Some(9));
    }

    #[test]
    fn test_blocks_detects_threat() {
        let board = TicTacToe::from_picture("OO. X.. X..");
        assert!(board.blocks(2, Mark::First));
        assert!(!board.blocks(5, Mark::First));
    }
}
