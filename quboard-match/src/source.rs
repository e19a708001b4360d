//! Who picks a player's moves

use quboard_core::Difficulty;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveSource {
    /// Positions arrive as `Select` events
    Human,
    Local(Difficulty),
    /// The scoring program plus the external solver
    Solver,
}

impl MoveSource {
    pub fn is_human(self) -> bool {
        matches!(self, MoveSource::Human)
    }

    pub fn difficulty(self) -> Option<Difficulty> {
        match self {
            MoveSource::Local(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for MoveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveSource::Human => write!(f, "Human"),
            MoveSource::Local(d) => write!(f, "CPU ({})", d),
            MoveSource::Solver => write!(f, "Solver"),
        }
    }
}

impl FromStr for MoveSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(MoveSource::Human),
            "solver" | "quantum" => Ok(MoveSource::Solver),
            other => other
                .parse::<Difficulty>()
                .map(MoveSource::Local)
                .map_err(|_| {
                    format!(
                        "unknown move source '{}' (expected human, easy, medium, hard or solver)",
                        s
                    )
                }),
        }
    }
}

/// Which difficulties `Configure` may pick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Every difficulty is selectable
    #[default]
    Classic,
    /// Only tiers unlocked by beating the tier below
    Unlock,
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" => Ok(GameMode::Classic),
            "unlock" => Ok(GameMode::Unlock),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::Classic => write!(f, "Classic"),
            GameMode::Unlock => write!(f, "Unlock"),
        }
    }
}
