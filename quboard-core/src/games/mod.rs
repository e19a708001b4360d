//! The three supported board games

pub mod connect_four;
pub mod mancala;
pub mod tictactoe;

pub use connect_four::ConnectFour;
pub use mancala::Mancala;
pub use tictactoe::TicTacToe;
