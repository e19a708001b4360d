//! Program and payload commands: compile, check, validate
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run_compile(), run_check(), run_validate() - orchestration
//! - Level 2: load_program(), board_snapshot(), compile()
//! - Level 3: (delegated to quboard-script)
//! - Level 4: output formatting

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use quboard_core::Game;
use quboard_match::MatchConfig;
use quboard_script::parser::parse_program;
use quboard_script::{normalize, normalize_str, OptimizationPayload, Sandbox, SandboxConfig};

use crate::game_arg::{with_game, GameArg};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

#[derive(Args)]
pub struct CompileArgs {
    #[arg(long, value_enum)]
    pub game: GameArg,

    /// Scoring program file
    #[arg(long, value_name = "FILE")]
    pub program: PathBuf,

    /// Board snapshot JSON; defaults to the opening position
    #[arg(long, value_name = "JSON")]
    pub board: Option<String>,

    /// Match config JSON file, for sandbox limits
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Scoring program file
    #[arg(long, value_name = "FILE")]
    pub program: PathBuf,

    /// Entry function name to look for
    #[arg(long, default_value = quboard_script::ENTRY_FUNCTION)]
    pub entry: String,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Payload JSON file
    #[arg(long, value_name = "FILE")]
    pub payload: PathBuf,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run the program against one board, normalize and print the payload
pub fn run_compile(args: CompileArgs) -> Result<()> {
    let source = load_program(&args.program)?;
    let sandbox_config = match &args.config {
        Some(path) => MatchConfig::load(path)?.sandbox,
        None => SandboxConfig::default(),
    };
    let board = match &args.board {
        Some(text) => serde_json::from_str(text).context("--board is not valid JSON")?,
        None => with_game!(args.game.kind(), opening_snapshot()),
    };

    let payload = compile(&source, &board, sandbox_config)?;
    print_payload(&payload)
}

pub fn run_check(args: CheckArgs) -> Result<()> {
    let source = load_program(&args.program)?;
    let program =
        parse_program(&source).with_context(|| format!("parsing {}", args.program.display()))?;
    match program.function(&args.entry) {
        Some(def) => {
            println!("ok: {}({}) found", args.entry, def.params.join(", "));
            Ok(())
        }
        None => anyhow::bail!("function '{}' not found in {}", args.entry, args.program.display()),
    }
}

pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let text = std::fs::read_to_string(&args.payload)
        .with_context(|| format!("reading payload {}", args.payload.display()))?;
    let payload =
        normalize_str(&text).with_context(|| format!("validating {}", args.payload.display()))?;
    print_payload(&payload)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

fn load_program(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading program {}", path.display()))
}

fn opening_snapshot<G: Game>() -> serde_json::Value {
    G::default().snapshot()
}

fn compile(
    source: &str,
    board: &serde_json::Value,
    config: SandboxConfig,
) -> Result<OptimizationPayload> {
    let outcome = Sandbox::new(config).run(source, board)?;
    for line in &outcome.trace {
        eprintln!("console: {}", line);
    }
    tracing::info!(shape = ?outcome.shape, steps = outcome.steps, "program finished");
    if outcome.placeholder {
        tracing::warn!("program declared no variables; placeholder x0 added");
    }
    Ok(normalize(&outcome.payload)?)
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn print_payload(payload: &OptimizationPayload) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&payload.to_json())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quboard_core::TicTacToe;

    const PROGRAM: &str = r#"
function createQuboForSingleMove(board) {
  var linear = {};
  for (var i = 0; i < board.length; i++) {
    if (board[i] === '') linear[i] = i === 4 ? -9 : -1;
  }
  return { linear: linear, quadratic: {} };
}
"#;

    #[test]
    fn test_compile_opening_board() {
        let board = opening_snapshot::<TicTacToe>();
        let payload = compile(PROGRAM, &board, SandboxConfig::default()).unwrap();
        assert_eq!(payload.variables.len(), 9);
        assert!(payload.objective.contains("-9 * x4"));
    }

    #[test]
    fn test_compile_reports_program_errors() {
        let board = opening_snapshot::<TicTacToe>();
        let err = compile("function other() {}", &board, SandboxConfig::default()).unwrap_err();
        assert!(err.to_string().contains("createQuboForSingleMove"));
    }

    #[test]
    fn test_check_finds_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("program.js");
        std::fs::write(&path, PROGRAM).unwrap();
        let ok = run_check(CheckArgs {
            program: path.clone(),
            entry: quboard_script::ENTRY_FUNCTION.into(),
        });
        assert!(ok.is_ok());
        let missing = run_check(CheckArgs {
            program: path,
            entry: "pick".into(),
        });
        assert!(missing.is_err());
    }

    #[test]
    fn test_validate_rejects_undeclared() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        std::fs::write(
            &path,
            r#"{"variables": {"x0": {"type": "Binary"}},
                "Constraints": [], "Objective": "x1", "Return": "0"}"#,
        )
        .unwrap();
        let err = run_validate(ValidateArgs { payload: path }).unwrap_err();
        assert!(format!("{:#}", err).contains("'x1' is not declared"));
    }
}
