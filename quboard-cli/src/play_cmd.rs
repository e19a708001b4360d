//! Play command - a best-of-N series in the terminal
//!
//! Human positions are read from stdin; CPU turns use the local opponent and
//! solver turns run the scoring program and call the solver endpoint.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use quboard_core::{Game, HardPlay, Mark};
use quboard_match::{
    Diagnostic, Event, GameMode, Level, Match, MatchConfig, MoveSource, Phase, Response, TurnJob,
};
use quboard_solver::{HttpSolver, Solver};

use crate::game_arg::{with_game, GameArg};

#[derive(Args)]
pub struct PlayArgs {
    #[arg(long, value_enum)]
    pub game: GameArg,

    /// Player 1: human, easy, medium, hard or solver
    #[arg(long, default_value = "human")]
    pub first: MoveSource,

    /// Player 2: human, easy, medium, hard or solver
    #[arg(long, default_value = "easy")]
    pub second: MoveSource,

    /// Scoring program for solver players
    #[arg(long, value_name = "FILE")]
    pub program: Option<PathBuf>,

    /// Match config JSON file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "classic")]
    pub mode: GameMode,

    /// Solver endpoint, overriding the config file
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Round wins needed to take the series
    #[arg(long)]
    pub wins: Option<u32>,

    /// Engine seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory for saved games
    #[arg(long, value_name = "DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Continue the saved game instead of starting fresh
    #[arg(long)]
    pub resume: bool,
}

pub fn run(args: PlayArgs) -> Result<()> {
    let config = build_config(&args)?;
    let program = match &args.program {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading program {}", path.display()))?,
        None => String::new(),
    };

    tracing::info!(
        "Starting {} series: {} vs {} (first to {})",
        args.game.kind(),
        args.first,
        args.second,
        config.wins_to_take_series
    );

    with_game!(args.game.kind(), play_series(&args, config, program))
}

/// Config file first, then flag overrides
fn build_config(args: &PlayArgs) -> Result<MatchConfig> {
    let mut config = match &args.config {
        Some(path) => MatchConfig::load(path)?,
        None => MatchConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config.solver = config.solver.with_endpoint(endpoint.clone());
    }
    if let Some(wins) = args.wins {
        config = config.with_wins_to_take_series(wins);
    }
    if let Some(seed) = args.seed {
        config.engine = config.engine.with_seed(seed);
    }
    if let Some(dir) = &args.snapshot_dir {
        config = config.with_snapshot_dir(dir.clone());
    }
    Ok(config)
}

fn play_series<G: HardPlay>(args: &PlayArgs, config: MatchConfig, program: String) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let solver = HttpSolver::new(config.solver.clone())?;
    let delay = config.move_delay();
    let mut game: Match<G> = Match::new(config).with_program(program);

    expect_accepted(game.handle(Event::EnterSetup(args.mode)))?;
    expect_accepted(game.handle(Event::Configure {
        mark: Mark::First,
        source: args.first,
    }))?;
    expect_accepted(game.handle(Event::Configure {
        mark: Mark::Second,
        source: args.second,
    }))?;
    let opening = if args.resume { Event::LoadSnapshot } else { Event::StartGame };
    expect_accepted(game.handle(opening))?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print_diagnostics(game.drain_diagnostics());
        match game.phase() {
            Phase::Playing => {
                let job = match game.begin_turn() {
                    Ok(job) => job,
                    Err(failure) => anyhow::bail!("round abandoned: {}", failure),
                };
                let result = match job {
                    None => {
                        println!("\n{}", game.board().render());
                        print!("{} to move (q to quit): ", game.mover());
                        io::stdout().flush()?;
                        let Some(line) = lines.next().transpose()? else {
                            break;
                        };
                        let line = line.trim();
                        if line.eq_ignore_ascii_case("q") {
                            break;
                        }
                        match line.parse::<usize>() {
                            Ok(position) => {
                                game.handle(Event::Select(position));
                            }
                            Err(_) => println!("enter a position number"),
                        }
                        continue;
                    }
                    Some(TurnJob::Local(_)) => {
                        std::thread::sleep(delay);
                        game.complete_local()
                    }
                    Some(TurnJob::Remote(payload)) => {
                        std::thread::sleep(delay);
                        let reply = runtime.block_on(solver.solve(&payload));
                        game.complete_remote(reply)
                    }
                };
                if let Err(failure) = result {
                    print_diagnostics(game.drain_diagnostics());
                    anyhow::bail!("round abandoned: {}", failure);
                }
            }
            Phase::NextRoundReady => {
                println!("\n{}", game.board().render());
                print_score(&game);
                game.handle(Event::Continue);
            }
            Phase::SeriesOver { winner } => {
                println!("\n{}", game.board().render());
                print_score(&game);
                println!("{} ({}) wins the series", winner, game.source(winner));
                break;
            }
            other => anyhow::bail!("unexpected phase {:?}", other),
        }
    }
    Ok(())
}

fn expect_accepted(response: Response) -> Result<()> {
    match response {
        Response::Accepted => Ok(()),
        Response::Ignored(reason) => anyhow::bail!(reason),
    }
}

fn print_score<G: HardPlay>(game: &Match<G>) {
    println!(
        "score: {} {} - {} {}",
        game.source(Mark::First),
        game.series().wins(Mark::First),
        game.series().wins(Mark::Second),
        game.source(Mark::Second)
    );
}

fn print_diagnostics(entries: Vec<Diagnostic>) {
    for entry in entries {
        if entry.level != Level::Info {
            eprintln!("{}", entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        play: PlayArgs,
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("match.json");
        std::fs::write(&path, r#"{"wins_to_take_series": 5, "engine": {"seed": 1}}"#).unwrap();
        let wrapper = Wrapper::parse_from([
            "quboard",
            "--game",
            "ttt",
            "--second",
            "hard",
            "--config",
            path.to_str().unwrap(),
            "--seed",
            "9",
            "--endpoint",
            "http://solver:9000/quantum",
        ]);
        let config = build_config(&wrapper.play).unwrap();
        assert_eq!(config.wins_to_take_series, 5);
        assert_eq!(config.engine.seed, 9);
        assert_eq!(config.solver.endpoint, "http://solver:9000/quantum");
        assert_eq!(wrapper.play.second, MoveSource::Local(quboard_core::Difficulty::Hard));
    }
}
