//! Game-tree search: exact minimax for tic-tac-toe, store search for mancala

use crate::ai::HardPlay;
use crate::game::{Game, Mark};
use crate::games::{Mancala, TicTacToe};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Nodes deeper than this score as a draw
const MINIMAX_DEPTH_LIMIT: i32 = 5;

/// Win score at the root; each ply of delay costs one point
const MINIMAX_WIN: i32 = 10;

/// Plies searched by the mancala engine
const SOW_DEPTH: u32 = 6;

/// Terminal bonus for a finished mancala game
const SOW_WIN_VALUE: i32 = 1000;

const INFINITY: i32 = 1_000_000;

// ============================================================================
// TIC-TAC-TOE MINIMAX
// ============================================================================

/// Minimax score of `board` for `root`, with `to_move` about to play.
///
/// Returns the score and, at each node, the first child reaching it.
fn minimax(board: &mut TicTacToe, to_move: Mark, root: Mark, depth: i32) -> (i32, Option<usize>) {
    if board.is_win(root) {
        return (MINIMAX_WIN - depth, None);
    }
    if board.is_win(root.opponent()) {
        return (depth - MINIMAX_WIN, None);
    }
    let empty: Vec<usize> = board.empty_cells().collect();
    if empty.is_empty() || depth > MINIMAX_DEPTH_LIMIT {
        return (0, None);
    }

    let maximizing = to_move == root;
    let mut best_score = if maximizing { -INFINITY } else { INFINITY };
    let mut best_cell = None;

    for cell in empty {
        board.set(cell, Some(to_move));
        let (score, _) = minimax(board, to_move.opponent(), root, depth + 1);
        board.set(cell, None);

        let better = if maximizing { score > best_score } else { score < best_score };
        if better {
            best_score = score;
            best_cell = Some(cell);
        }
    }

    (best_score, best_cell)
}

/// Best cell for `mover` by depth-bounded minimax, ties to the lowest cell
pub fn best_cell(board: &TicTacToe, mover: Mark) -> Option<usize> {
    let mut scratch = board.clone();
    minimax(&mut scratch, mover, mover, 0).1
}

impl HardPlay for TicTacToe {
    fn hard_choice(&self, mover: Mark) -> Option<usize> {
        if self.legal_positions(mover).is_empty() {
            return None;
        }
        best_cell(self, mover)
    }
}

// ============================================================================
// MANCALA STORE SEARCH
// ============================================================================

fn sow_terminal(board: &Mancala, mover: Mark) -> i32 {
    let lead = board.store_lead(mover);
    lead.signum() * SOW_WIN_VALUE + lead
}

/// Negamax with alpha-beta over store difference.
///
/// An extra turn keeps the same mover, so its child is not negated. Every
/// move still consumes a ply.
fn sow_negamax(board: &Mancala, mover: Mark, depth: u32, mut alpha: i32, beta: i32) -> i32 {
    if board.is_finished() {
        return sow_terminal(board, mover);
    }
    if depth == 0 {
        return board.store_lead(mover);
    }

    let legal = board.legal_positions(mover);
    let mut best = -INFINITY;

    for &pit in Mancala::preference_order() {
        if !legal.contains(&pit) {
            continue;
        }
        let mut child = board.clone();
        let effect = match child.apply_move(pit, mover) {
            Ok(effect) => effect,
            Err(_) => continue,
        };
        let turn_changed = !effect.extra_turn || child.is_finished();

        let score = if turn_changed {
            -sow_negamax(&child, mover.opponent(), depth - 1, -beta, -alpha)
        } else {
            sow_negamax(&child, mover, depth - 1, alpha, beta)
        };

        best = best.max(score);
        alpha = alpha.max(score);
        if alpha >= beta {
            break;
        }
    }

    best
}

/// Best pit for `mover`, scanned nearest-the-store first
pub fn best_pit(board: &Mancala, mover: Mark) -> Option<usize> {
    let legal = board.legal_positions(mover);
    let mut best: Option<(i32, usize)> = None;

    for &pit in Mancala::preference_order() {
        if !legal.contains(&pit) {
            continue;
        }
        let mut child = board.clone();
        let Ok(effect) = child.apply_move(pit, mover) else {
            continue;
        };
        let turn_changed = !effect.extra_turn || child.is_finished();
        let score = if turn_changed {
            -sow_negamax(&child, mover.opponent(), SOW_DEPTH - 1, -INFINITY, INFINITY)
        } else {
            sow_negamax(&child, mover, SOW_DEPTH - 1, -INFINITY, INFINITY)
        };
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, pit));
        }
    }

    best.map(|(_, pit)| pit)
}

impl HardPlay for Mancala {
    fn hard_choice(&self, mover: Mark) -> Option<usize> {
        best_pit(self, mover)
    }
}
