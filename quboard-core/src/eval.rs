//! Weighted column heuristic for the drop game

use crate::ai::{blocking_move, winning_move, HardPlay};
use crate::game::{Game, Mark};
use crate::games::connect_four::{ConnectFour, AXES, CENTER_COLUMN, COLUMNS, ROWS};
use tracing::debug;

// ============================================================================
// WEIGHTS
// ============================================================================

/// Multiplier on `(4 - distance from center)`
pub const CENTER_WEIGHT: i32 = 2;

/// Applied when the cell above the landing cell wins for the opponent
pub const REPLY_LOSS_PENALTY: i32 = -50;

/// Multiplier on the summed connection score
pub const CONNECTION_WEIGHT: i32 = 3;

const RUN_OF_TWO: i32 = 1;
const RUN_OF_THREE: i32 = 5;

/// How far to look along an axis from the landing cell
const REACH: isize = 3;

// ============================================================================
// SCORING
// ============================================================================

/// Connection potential of dropping `mover` at `(row, col)`.
///
/// Along each axis, count `mover`'s pieces outward in both directions; an
/// empty cell ends that direction and marks the run as extendable.
pub fn connection_score(board: &ConnectFour, row: usize, col: usize, mover: Mark) -> i32 {
    let mut trial = board.clone();
    trial.set(row * COLUMNS + col, Some(mover));

    let mut score = 0;
    for (dr, dc) in AXES {
        let mut count = 1;
        let mut open = false;
        for sign in [1isize, -1] {
            for step in 1..=REACH {
                let r = row as isize + dr * step * sign;
                let c = col as isize + dc * step * sign;
                if r < 0 || r >= ROWS as isize || c < 0 || c >= COLUMNS as isize {
                    break;
                }
                match trial.cell(r as usize, c as usize) {
                    Some(m) if m == mover => count += 1,
                    None => {
                        open = true;
                        break;
                    }
                    Some(_) => break,
                }
            }
        }
        if open {
            score += match count {
                2 => RUN_OF_TWO,
                3 => RUN_OF_THREE,
                _ => 0,
            };
        }
    }
    score
}

/// Heuristic value of dropping into `col`, `None` for a full column
pub fn column_score(board: &ConnectFour, col: usize, mover: Mark) -> Option<i32> {
    let row = board.landing_row(col)?;
    let distance = (col as i32 - CENTER_COLUMN as i32).abs();
    let mut score = (4 - distance) * CENTER_WEIGHT;

    if row > 0 {
        let opponent = mover.opponent();
        let above = (row - 1) * COLUMNS + col;
        let mut trial = board.clone();
        trial.set(row * COLUMNS + col, Some(mover));
        trial.set(above, Some(opponent));
        if trial.wins_through(above, opponent) {
            score += REPLY_LOSS_PENALTY;
        }
    }

    score += connection_score(board, row, col, mover) * CONNECTION_WEIGHT;
    Some(score)
}

/// Win, else block, else the highest-scoring column (first found on ties)
pub fn best_column(board: &ConnectFour, mover: Mark) -> Option<usize> {
    if let Some(col) = winning_move(board, mover).or_else(|| blocking_move(board, mover)) {
        return Some(col);
    }

    let mut best: Option<(i32, usize)> = None;
    for col in board.legal_positions(mover) {
        let Some(score) = column_score(board, col, mover) else {
            continue;
        };
        debug!(col, score, "column score");
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, col));
        }
    }
    best.map(|(_, col)| col)
}

impl HardPlay for ConnectFour {
    fn hard_choice(&self, mover: Mark) -> Option<usize> {
        best_column(self, mover)
    }
}
