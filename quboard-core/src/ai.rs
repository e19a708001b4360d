//! Local opponent engine: random, strategic one-ply, and per-game hard play

use crate::game::{Game, Mark};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

// ============================================================================
// CONFIG
// ============================================================================

/// Default engine seed, fixed so unseeded runs are reproducible
pub const DEFAULT_SEED: u64 = 42;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// The tier a series win against this difficulty unlocks
    pub fn next(self) -> Option<Difficulty> {
        match self {
            Difficulty::Easy => Some(Difficulty::Medium),
            Difficulty::Medium => Some(Difficulty::Hard),
            Difficulty::Hard => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

/// Engine settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { seed: DEFAULT_SEED }
    }
}

impl EngineConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

// ============================================================================
// HARD PLAY
// ============================================================================

/// The strongest local strategy a game offers
pub trait HardPlay: Game {
    fn hard_choice(&self, mover: Mark) -> Option<usize>;
}

// ============================================================================
// LOCAL OPPONENT
// ============================================================================

/// CPU opponent. Owns its RNG; boards are only read.
pub struct LocalOpponent {
    rng: ChaCha8Rng,
}

impl Default for LocalOpponent {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalOpponent {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_seed(config.seed)
    }

    /// Pick a move for `mover`. `None` only when no legal position exists.
    pub fn choose<G: HardPlay>(
        &mut self,
        game: &G,
        mover: Mark,
        difficulty: Difficulty,
    ) -> Option<usize> {
        let choice = match difficulty {
            Difficulty::Easy => self.random_choice(game, mover),
            Difficulty::Medium => strategic_choice(game, mover),
            Difficulty::Hard => game.hard_choice(mover),
        };
        debug!(game = %G::KIND, %mover, %difficulty, ?choice, "local opponent chose");
        choice
    }

    /// Uniform choice among legal positions
    pub fn random_choice<G: Game>(&mut self, game: &G, mover: Mark) -> Option<usize> {
        game.legal_positions(mover).choose(&mut self.rng).copied()
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

// ============================================================================
// STRATEGIC ONE-PLY
// ============================================================================

/// First position (in position order) that wins immediately for `mover`
pub fn winning_move<G: Game>(game: &G, mover: Mark) -> Option<usize> {
    game.legal_positions(mover).into_iter().find(|&pos| {
        let mut trial = game.clone();
        trial.apply_move(pos, mover).is_ok() && trial.is_win(mover)
    })
}

/// First position (in position order) that denies the opponent an immediate win
pub fn blocking_move<G: Game>(game: &G, mover: Mark) -> Option<usize> {
    game.legal_positions(mover)
        .into_iter()
        .find(|&pos| game.blocks(pos, mover))
}

/// Win, else block, else the game's positional preference
pub fn strategic_choice<G: Game>(game: &G, mover: Mark) -> Option<usize> {
    if let Some(pos) = winning_move(game, mover) {
        debug!(position = pos, "found winning move");
        return Some(pos);
    }
    if let Some(pos) = blocking_move(game, mover) {
        debug!(position = pos, "found blocking move");
        return Some(pos);
    }
    let legal = game.legal_positions(mover);
    G::preference_order()
        .iter()
        .copied()
        .find(|pos| legal.contains(pos))
        .or_else(|| legal.first().copied())
}
