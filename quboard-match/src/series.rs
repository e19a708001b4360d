//! Best-of-N bookkeeping and difficulty unlocks

use crate::source::MoveSource;
use quboard_core::{Difficulty, Mark};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSeries {
    wins: [u32; 2],
    unlocked: BTreeSet<Difficulty>,
}

impl Default for MatchSeries {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchSeries {
    /// Fresh series: no wins, only `Easy` unlocked
    pub fn new() -> Self {
        Self {
            wins: [0, 0],
            unlocked: BTreeSet::from([Difficulty::Easy]),
        }
    }

    pub fn wins(&self, mark: Mark) -> u32 {
        self.wins[mark.index()]
    }

    /// Count a round win; true once `mark` has `threshold` wins
    pub fn record_win(&mut self, mark: Mark, threshold: u32) -> bool {
        self.wins[mark.index()] += 1;
        self.wins[mark.index()] >= threshold
    }

    /// Zero the score; unlocked tiers are kept
    pub fn reset_score(&mut self) {
        self.wins = [0, 0];
    }

    pub fn is_unlocked(&self, difficulty: Difficulty) -> bool {
        self.unlocked.contains(&difficulty)
    }

    pub fn unlocked(&self) -> impl Iterator<Item = Difficulty> + '_ {
        self.unlocked.iter().copied()
    }

    /// Apply the unlock rule for a finished series.
    ///
    /// A human or solver beating a local opponent unlocks the tier above the
    /// loser's, unless that tier is already open. Returns the new tier.
    pub fn unlock_after(&mut self, winner: MoveSource, loser: MoveSource) -> Option<Difficulty> {
        if !matches!(winner, MoveSource::Human | MoveSource::Solver) {
            return None;
        }
        let tier = loser.difficulty()?.next()?;
        if self.unlocked.insert(tier) {
            Some(tier)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold() {
        let mut series = MatchSeries::new();
        assert!(!series.record_win(Mark::First, 3));
        assert!(!series.record_win(Mark::Second, 3));
        assert!(!series.record_win(Mark::First, 3));
        assert!(series.record_win(Mark::First, 3));
        assert_eq!(series.wins(Mark::First), 3);
        series.reset_score();
        assert_eq!(series.wins(Mark::First), 0);
    }

    #[test]
    fn test_unlock_chain() {
        let mut series = MatchSeries::new();
        let easy = MoveSource::Local(Difficulty::Easy);
        let medium = MoveSource::Local(Difficulty::Medium);
        assert_eq!(series.unlock_after(MoveSource::Human, easy), Some(Difficulty::Medium));
        assert_eq!(series.unlock_after(MoveSource::Human, easy), None);
        assert_eq!(series.unlock_after(MoveSource::Solver, medium), Some(Difficulty::Hard));
        assert!(series.is_unlocked(Difficulty::Hard));
    }

    #[test]
    fn test_no_unlock_for_cpu_winner_or_hard_loser() {
        let mut series = MatchSeries::new();
        let easy = MoveSource::Local(Difficulty::Easy);
        assert_eq!(series.unlock_after(MoveSource::Local(Difficulty::Hard), easy), None);
        let hard = MoveSource::Local(Difficulty::Hard);
        assert_eq!(series.unlock_after(MoveSource::Human, hard), None);
        assert_eq!(series.unlock_after(MoveSource::Human, MoveSource::Solver), None);
        assert_eq!(series.unlocked().collect::<Vec<_>>(), vec![Difficulty::Easy]);
    }
}
