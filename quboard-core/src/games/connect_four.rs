//! Four-in-a-row drop game on a 7-column, 6-row grid
//!
//! Cells are stored row-major with row 0 at the top, so the bottom row is 5
//! and cell `i` sits in column `i % 7`.

use crate::game::{Game, GameKind, IllegalMove, Mark, MoveEffect};
use serde::{Deserialize, Serialize};

pub const COLUMNS: usize = 7;
pub const ROWS: usize = 6;
pub const CELLS: usize = COLUMNS * ROWS;
pub const CENTER_COLUMN: usize = 3;

/// Row/column steps for the 4 line axes: horizontal, vertical, two diagonals
pub const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

const PREFERENCE: [usize; COLUMNS] = [3, 2, 4, 1, 5, 0, 6];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCells")]
pub struct ConnectFour {
    cells: Vec<Option<Mark>>,
}

#[derive(Deserialize)]
struct RawCells {
    cells: Vec<Option<Mark>>,
}

impl TryFrom<RawCells> for ConnectFour {
    type Error = String;

    fn try_from(raw: RawCells) -> Result<Self, Self::Error> {
        if raw.cells.len() != CELLS {
            return Err(format!("expected {} cells, found {}", CELLS, raw.cells.len()));
        }
        Ok(Self { cells: raw.cells })
    }
}

impl Default for ConnectFour {
    fn default() -> Self {
        Self {
            cells: vec![None; CELLS],
        }
    }
}

impl ConnectFour {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<Mark> {
        if row >= ROWS || col >= COLUMNS {
            return None;
        }
        self.cells.get(row * COLUMNS + col).copied().flatten()
    }

    /// Lowest empty row in `col`, if the column has room
    pub fn landing_row(&self, col: usize) -> Option<usize> {
        if col >= COLUMNS {
            return None;
        }
        (0..ROWS).rev().find(|&row| self.cells[row * COLUMNS + col].is_none())
    }

    pub fn is_full(&self) -> bool {
        (0..COLUMNS).all(|col| self.landing_row(col).is_none())
    }

    /// Length of the run through `(row, col)` along `axis`, counting marks of `mark`
    pub fn run_length(&self, row: usize, col: usize, axis: (isize, isize), mark: Mark) -> usize {
        let mut count = 1;
        for sign in [1isize, -1] {
            let (mut r, mut c) = (row as isize, col as isize);
            loop {
                r += axis.0 * sign;
                c += axis.1 * sign;
                if r < 0 || r >= ROWS as isize || c < 0 || c >= COLUMNS as isize {
                    break;
                }
                if self.cells[r as usize * COLUMNS + c as usize] != Some(mark) {
                    break;
                }
                count += 1;
            }
        }
        count
    }

    /// Does the piece at `index` complete four in a row for `mark`?
    pub fn wins_through(&self, index: usize, mark: Mark) -> bool {
        if self.cells.get(index).copied().flatten() != Some(mark) {
            return false;
        }
        let (row, col) = (index / COLUMNS, index % COLUMNS);
        AXES.iter().any(|&axis| self.run_length(row, col, axis, mark) >= 4)
    }

    /// Place `mark` directly into a cell, ignoring gravity
    pub(crate) fn set(&mut self, index: usize, mark: Option<Mark>) {
        self.cells[index] = mark;
    }

    /// Build a board by replaying `(column, mark)` drops in order
    pub fn from_drops(drops: &[(usize, Mark)]) -> Result<Self, IllegalMove> {
        let mut board = Self::new();
        for &(col, mark) in drops {
            board.apply_move(col, mark)?;
        }
        Ok(board)
    }
}

impl Game for ConnectFour {
    const KIND: GameKind = GameKind::ConnectFour;

    fn apply_move(&mut self, position: usize, mover: Mark) -> Result<MoveEffect, IllegalMove> {
        if position >= CELLS {
            return Err(IllegalMove::OutOfRange(position));
        }
        let col = position % COLUMNS;
        if self.is_win(Mark::First) || self.is_win(Mark::Second) {
            return Err(IllegalMove::GameOver);
        }
        let row = self.landing_row(col).ok_or(IllegalMove::ColumnFull(col))?;
        let index = row * COLUMNS + col;
        self.cells[index] = Some(mover);
        Ok(MoveEffect {
            landed: index,
            ..MoveEffect::default()
        })
    }

    fn is_win(&self, mover: Mark) -> bool {
        (0..CELLS).any(|i| self.wins_through(i, mover))
    }

    fn is_draw(&self) -> bool {
        self.is_full() && !self.is_win(Mark::First) && !self.is_win(Mark::Second)
    }

    fn legal_positions(&self, _mover: Mark) -> Vec<usize> {
        if self.is_win(Mark::First) || self.is_win(Mark::Second) {
            return Vec::new();
        }
        (0..COLUMNS).filter(|&c| self.landing_row(c).is_some()).collect()
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
        for row in 0..ROWS {
            out.push('|');
            for col in 0..COLUMNS {
                let ch = match self.cell(row, col) {
                    Some(m) => m.symbol(),
                    None => ".",
                };
                out.push_str(ch);
                out.push('|');
            }
            out.push('\n');
        }
        out.push_str(" 0 1 2 3 4 5 6\n");
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
    fn test_drop_to_bottom() {
        let mut board = ConnectFour::new();
        let effect = board.apply_move(3, Mark::First).unwrap();
        assert_eq!(effect.landed, 5 * COLUMNS + 3);
        let effect = board.apply_move(3, Mark::Second).unwrap();
        assert_eq!(effect.landed, 4 * COLUMNS + 3);
    }

    #[test]
    fn test_cell_index_maps_to_column() {
        let mut board = ConnectFour::new();
        let effect = board.apply_move(10, Mark::First).unwrap();
        assert_eq!(effect.landed % COLUMNS, 3);
    }

    #[test]
    fn test_full_column_rejected_unchanged() {
        let mut board = ConnectFour::new();
        for i in 0..ROWS {
            let mark = if i % 2 == 0 { Mark::First } else { Mark::Second };
            board.apply_move(3, mark).unwrap();
        }
        let before = board.clone();
        assert_eq!(board.apply_move(3, Mark::First), Err(IllegalMove::ColumnFull(3)));
        assert_eq!(board, before);
        assert!(!board.legal_positions(Mark::First).contains(&3));
    }

    #[test]
    fn test_horizontal_win() {
        let board = ConnectFour::from_drops(&[
            (0, Mark::First),
            (0, Mark::Second),
            (1, Mark::First),
            (1, Mark::Second),
            (2, Mark::First),
            (2, Mark::Second),
            (3, Mark::First),
        ])
        .unwrap();
        assert!(board.is_win(Mark::First));
        assert!(!board.is_win(Mark::Second));
    }

    #[test]
    fn test_no_wrap_across_edge() {
        let mut board = ConnectFour::new();
        // Row 4 cols 5,6 and row 5 cols 0,1 are consecutive in memory only
        board.set(4 * COLUMNS + 5, Some(Mark::First));
        board.set(4 * COLUMNS + 6, Some(Mark::First));
        board.set(5 * COLUMNS, Some(Mark::First));
        board.set(5 * COLUMNS + 1, Some(Mark::First));
        assert!(!board.is_win(Mark::First));
    }

    #[test]
    fn test_diagonal_win() {
        let mut board = ConnectFour::new();
        for k in 0..4 {
            board.set((5 - k) * COLUMNS + k, Some(Mark::Second));
        }
        assert!(board.is_win(Mark::Second));
    }

    #[test]
    fn test_deserialize_rejects_wrong_size() {
        assert!(serde_json::from_str::<ConnectFour>(r#"{"cells":[null,null]}"#).is_err());
        let json = serde_json::to_string(&ConnectFour::new()).unwrap();
        assert!(serde_json::from_str::<ConnectFour>(&json).is_ok());
    }

    #[test]
    fn test_snapshot_len() {
        assert_eq!(ConnectFour::new().snapshot().as_array().map(Vec::len), Some(42));
    }
}
