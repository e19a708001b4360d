//! `--game` values and per-game dispatch

use clap::ValueEnum;
use quboard_core::GameKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum GameArg {
    #[value(name = "ttt", alias = "tictactoe")]
    TicTacToe,
    #[value(name = "connect4", alias = "c4")]
    ConnectFour,
    Mancala,
}

impl GameArg {
    pub fn kind(self) -> GameKind {
        match self {
            GameArg::TicTacToe => GameKind::TicTacToe,
            GameArg::ConnectFour => GameKind::ConnectFour,
            GameArg::Mancala => GameKind::Mancala,
        }
    }
}

/// Call a generic function with the board type chosen by a `GameKind`
macro_rules! with_game {
    ($kind:expr, $func:ident($($arg:expr),* $(,)?)) => {
        match $kind {
            quboard_core::GameKind::TicTacToe => $func::<quboard_core::TicTacToe>($($arg),*),
            quboard_core::GameKind::ConnectFour => $func::<quboard_core::ConnectFour>($($arg),*),
            quboard_core::GameKind::Mancala => $func::<quboard_core::Mancala>($($arg),*),
        }
    };
}

pub(crate) use with_game;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_parse() {
        assert_eq!(GameArg::from_str("ttt", true).unwrap(), GameArg::TicTacToe);
        assert_eq!(GameArg::from_str("c4", true).unwrap(), GameArg::ConnectFour);
        assert_eq!(GameArg::from_str("mancala", true).unwrap().kind(), GameKind::Mancala);
    }
}
