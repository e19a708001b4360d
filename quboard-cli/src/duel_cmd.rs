//! Duel command - local opponents against each other
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run() - orchestration
//! - Level 2: play_duel(), report_results()
//! - Level 3: play_single_round(), compute_tally()
//! - Level 4: formatting utilities

use anyhow::Result;
use clap::Args;
use rayon::prelude::*;

use quboard_core::{Difficulty, Game, HardPlay, LocalOpponent, Mark, Outcome};

use crate::game_arg::{with_game, GameArg};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct DuelArgs {
    #[arg(long, value_enum)]
    pub game: GameArg,

    /// Difficulty of player 1
    #[arg(long, default_value = "medium")]
    pub first: Difficulty,

    /// Difficulty of player 2
    #[arg(long, default_value = "easy")]
    pub second: Difficulty,

    /// Number of rounds to play
    #[arg(long, default_value = "100")]
    pub rounds: usize,

    /// Base seed; round i uses seed + i
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

/// Result of one round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RoundRecord {
    outcome: Outcome,
    moves: u32,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
struct Tally {
    rounds: usize,
    first_wins: usize,
    second_wins: usize,
    draws: usize,
    avg_moves: f32,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

pub fn run(args: DuelArgs) -> Result<()> {
    tracing::info!(
        "Starting duel: {} vs {} at {} ({} rounds)",
        args.first,
        args.second,
        args.game.kind(),
        args.rounds
    );

    let records = with_game!(args.game.kind(), play_duel(&args));
    let tally = compute_tally(&records);
    report_results(&tally, &args)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Play every round in parallel; each round owns its opponents
fn play_duel<G: HardPlay>(args: &DuelArgs) -> Vec<RoundRecord> {
    (0..args.rounds)
        .into_par_iter()
        .map(|i| {
            let seed = args.seed.wrapping_add(i as u64);
            play_single_round::<G>([args.first, args.second], seed)
        })
        .collect()
}

fn report_results(tally: &Tally, args: &DuelArgs) -> Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(tally)?);
    } else {
        print_text_results(tally, args);
    }
    Ok(())
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

fn play_single_round<G: HardPlay>(difficulties: [Difficulty; 2], seed: u64) -> RoundRecord {
    let mut board = G::default();
    let mut opponents = [
        LocalOpponent::with_seed(seed),
        LocalOpponent::with_seed(seed ^ 0x9e37_79b9),
    ];
    let mut mover = Mark::First;
    let mut moves = 0;

    while !board.is_over() {
        let i = mover.index();
        let Some(position) = opponents[i].choose(&board, mover, difficulties[i]) else {
            break;
        };
        match board.apply_move(position, mover) {
            Ok(effect) => {
                moves += 1;
                if !effect.extra_turn {
                    mover = mover.opponent();
                }
            }
            Err(e) => {
                tracing::warn!(position, error = %e, "opponent chose an illegal move");
                break;
            }
        }
    }

    RoundRecord {
        outcome: board.outcome(),
        moves,
    }
}

fn compute_tally(records: &[RoundRecord]) -> Tally {
    let count = |outcome: Outcome| records.iter().filter(|r| r.outcome == outcome).count();
    let total_moves: u32 = records.iter().map(|r| r.moves).sum();
    Tally {
        rounds: records.len(),
        first_wins: count(Outcome::Win(Mark::First)),
        second_wins: count(Outcome::Win(Mark::Second)),
        draws: count(Outcome::Draw),
        avg_moves: if records.is_empty() {
            0.0
        } else {
            total_moves as f32 / records.len() as f32
        },
    }
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn percent(part: usize, total: usize) -> f32 {
    if total > 0 {
        part as f32 / total as f32 * 100.0
    } else {
        0.0
    }
}

fn print_text_results(tally: &Tally, args: &DuelArgs) {
    println!("\n=== Duel Results ({}) ===", args.game.kind());
    println!("Rounds:        {}", tally.rounds);
    println!(
        "First ({}):  {} ({:.1}%)",
        args.first,
        tally.first_wins,
        percent(tally.first_wins, tally.rounds)
    );
    println!(
        "Second ({}): {} ({:.1}%)",
        args.second,
        tally.second_wins,
        percent(tally.second_wins, tally.rounds)
    );
    println!("Draws:         {} ({:.1}%)", tally.draws, percent(tally.draws, tally.rounds));
    println!("Avg moves:     {:.1}", tally.avg_moves);
}

// ============================================================================
// TESTS
// ============================================================================
