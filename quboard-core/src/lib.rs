//! QUBOARD Core - Board games and local opponents
//!
//! This crate provides the rules and CPU play for QUBOARD:
//! - A shared `Game` trait over marks, positions and outcomes
//! - Tic-tac-toe, connect-four and mancala boards
//! - Random and strategic one-ply opponents
//! - Minimax (tic-tac-toe), column heuristic (connect-four) and store search (mancala)

pub mod game;
pub mod games;
pub mod ai;
pub mod search;
pub mod eval;

// Re-exports for convenient access
pub use game::{Game, GameKind, IllegalMove, Mark, MoveEffect, Outcome};
pub use games::{ConnectFour, Mancala, TicTacToe};
pub use ai::{Difficulty, EngineConfig, HardPlay, LocalOpponent};
