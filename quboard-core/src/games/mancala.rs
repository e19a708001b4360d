//! Seed-sowing pit game: two rows of 6 pits plus a store per player
//!
//! From the mover's side a sow walks 13 virtual slots: own pits `0..=5`,
//! own store `6`, opponent pits `7..=12`. The opponent's store is skipped.

use crate::game::{Game, GameKind, IllegalMove, Mark, MoveEffect};
use serde::{Deserialize, Serialize};

pub const PITS: usize = 6;
pub const SEEDS_PER_PIT: u32 = 4;
pub const TOTAL_SEEDS: u32 = SEEDS_PER_PIT * PITS as u32 * 2;

/// Virtual slot of the mover's own store
pub const STORE_SLOT: usize = 6;
/// Virtual slot of the opponent's store, never sown into
const SKIPPED_SLOT: usize = 13;

/// Pits closest to the store first
const PREFERENCE: [usize; PITS] = [5, 4, 3, 2, 1, 0];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mancala {
    /// `pits[mark][i]`; pit `i` of one side faces pit `5 - i` of the other
    pits: [[u32; PITS]; 2],
    stores: [u32; 2],
}

impl Default for Mancala {
    fn default() -> Self {
        Self {
            pits: [[SEEDS_PER_PIT; PITS]; 2],
            stores: [0; 2],
        }
    }
}

impl Mancala {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(pits: [[u32; PITS]; 2], stores: [u32; 2]) -> Self {
        Self { pits, stores }
    }

    pub fn pits(&self, mark: Mark) -> &[u32; PITS] {
        &self.pits[mark.index()]
    }

    pub fn store(&self, mark: Mark) -> u32 {
        self.stores[mark.index()]
    }

    pub fn total_seeds(&self) -> u32 {
        self.pits.iter().flatten().sum::<u32>() + self.stores.iter().sum::<u32>()
    }

    /// Store difference from `mark`'s point of view
    pub fn store_lead(&self, mark: Mark) -> i32 {
        self.store(mark) as i32 - self.store(mark.opponent()) as i32
    }

    fn row_empty(&self, mark: Mark) -> bool {
        self.pits[mark.index()].iter().all(|&s| s == 0)
    }

    pub fn is_finished(&self) -> bool {
        self.row_empty(Mark::First) || self.row_empty(Mark::Second)
    }

    /// Sweep the remaining row into its owner's store once a side is empty
    fn settle(&mut self) {
        if !self.is_finished() {
            return;
        }
        for mark in [Mark::First, Mark::Second] {
            let rest: u32 = self.pits[mark.index()].iter().sum();
            self.stores[mark.index()] += rest;
            self.pits[mark.index()] = [0; PITS];
        }
    }

    /// Does `mark` have a single move that ends the game in their favor?
    pub fn has_winning_move(&self, mark: Mark) -> bool {
        self.legal_positions(mark).into_iter().any(|pit| {
            let mut trial = self.clone();
            trial.apply_move(pit, mark).is_ok() && trial.is_win(mark)
        })
    }
}

impl Game for Mancala {
    const KIND: GameKind = GameKind::Mancala;

    fn apply_move(&mut self, position: usize, mover: Mark) -> Result<MoveEffect, IllegalMove> {
        if position >= PITS {
            return Err(IllegalMove::OutOfRange(position));
        }
        if self.is_finished() {
            return Err(IllegalMove::GameOver);
        }
        let own = mover.index();
        let other = mover.opponent().index();
        let mut seeds = self.pits[own][position];
        if seeds == 0 {
            return Err(IllegalMove::EmptyPit(position));
        }

        self.pits[own][position] = 0;
        let mut slot = position + 1;
        let mut last = position;
        while seeds > 0 {
            if slot == SKIPPED_SLOT {
                slot = 0;
                continue;
            }
            match slot {
                0..=5 => self.pits[own][slot] += 1,
                STORE_SLOT => self.stores[own] += 1,
                _ => self.pits[other][slot - 7] += 1,
            }
            seeds -= 1;
            last = slot;
            slot += 1;
        }

        let mut effect = MoveEffect {
            landed: last,
            ..MoveEffect::default()
        };

        if last < PITS && self.pits[own][last] == 1 {
            let opposite = PITS - 1 - last;
            let taken = self.pits[other][opposite];
            if taken > 0 {
                self.pits[own][last] = 0;
                self.pits[other][opposite] = 0;
                effect.captured = taken + 1;
                self.stores[own] += effect.captured;
            }
        }
        effect.extra_turn = last == STORE_SLOT;

        self.settle();
        Ok(effect)
    }

    fn is_win(&self, mover: Mark) -> bool {
        self.is_finished() && self.store(mover) > self.store(mover.opponent())
    }

    fn is_draw(&self) -> bool {
        self.is_finished() && self.store(Mark::First) == self.store(Mark::Second)
    }

    fn legal_positions(&self, mover: Mark) -> Vec<usize> {
        if self.is_finished() {
            return Vec::new();
        }
        (0..PITS).filter(|&i| self.pits[mover.index()][i] > 0).collect()
    }

    fn snapshot(&self) -> serde_json::Value {
        let mut values = Vec::with_capacity(14);
        for mark in [Mark::First, Mark::Second] {
            values.extend(self.pits[mark.index()].iter().map(|&s| serde_json::Value::from(s)));
            values.push(serde_json::Value::from(self.stores[mark.index()]));
        }
        serde_json::Value::Array(values)
    }

    fn render(&self) -> String {
        let row = |mark: Mark, reversed: bool| {
            let mut cells: Vec<String> = self.pits[mark.index()]
                .iter()
                .map(|s| format!("{:>2}", s))
                .collect();
            if reversed {
                cells.reverse();
            }
            cells.join(" ")
        };
        format!(
            "      P2: {}\n[{:>2}]                      [{:>2}]\n      P1: {}\n          {}\n",
            row(Mark::Second, true),
            self.store(Mark::Second),
            self.store(Mark::First),
            row(Mark::First, false),
            " 0  1  2  3  4  5",
        )
    }

    fn preference_order() -> &'static [usize] {
        &PREFERENCE
    }

    fn blocks(&self, position: usize, mover: Mark) -> bool {
        let opponent = mover.opponent();
        if !self.has_winning_move(opponent) {
            return false;
        }
        let mut after = self.clone();
        after.apply_move(position, mover).is_ok()
            && !after.has_winning_move(opponent)
            && !after.is_win(opponent)
    }
}
