//! QUBOARD CLI - Command-line interface
//!
//! Commands:
//! - play: Play a series in the terminal
//! - compile: Run a scoring program and print its payload
//! - check: Parse a scoring program and look for its entry function
//! - validate: Normalize a payload file
//! - duel: Pit two local opponents against each other

mod compile_cmd;
mod duel_cmd;
mod game_arg;
mod play_cmd;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quboard")]
#[command(about = "Board games against local and solver-backed opponents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a best-of-N series in the terminal
    Play(play_cmd::PlayArgs),
    /// Run a scoring program against a board and print the payload
    Compile(compile_cmd::CompileArgs),
    /// Check that a scoring program parses and defines its entry function
    Check(compile_cmd::CheckArgs),
    /// Normalize a payload JSON file and print its canonical form
    Validate(compile_cmd::ValidateArgs),
    /// Play local opponents against each other
    Duel(duel_cmd::DuelArgs),
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => play_cmd::run(args),
        Commands::Compile(args) => compile_cmd::run_compile(args),
        Commands::Check(args) => compile_cmd::run_check(args),
        Commands::Validate(args) => compile_cmd::run_validate(args),
        Commands::Duel(args) => duel_cmd::run(args),
    }
}
