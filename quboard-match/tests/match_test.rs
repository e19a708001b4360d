//! Scenario tests for the turn orchestrator and its async driver

use quboard_core::{ConnectFour, Difficulty, Game, HardPlay, Mancala, Mark, TicTacToe};
use quboard_match::{
    AfterMove, Event, GameMode, Level, Match, MatchConfig, MatchDriver, MoveSource, OccupiedPolicy,
    Phase, Response, TurnFailure, TurnJob, Update,
};
use quboard_script::{OptimizationPayload, UserProgramError};
use quboard_solver::{parse_reply, Solver, SolverError, SolverReply};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// TEST FIXTURES
// ============================================================================

const CENTER_PROGRAM: &str = r#"
function createQuboForSingleMove(board) {
  const variables = {};
  for (let i = 0; i < board.length; i++) {
    if (board[i] === '') {
      variables[`x${i}`] = { "type": "Binary" };
    }
  }
  let objective = "0";
  if (board[4] === '') {
    objective = "-1 * x4";
  }
  return {
    "variables": variables,
    "Constraints": [{ "lhs": Object.keys(variables).join(" + "), "comparison": "=", "rhs": 1 }],
    "Objective": objective
  };
}
"#;

const BROKEN_PROGRAM: &str = "function createQuboForSingleMove(board) { return missing.value; }";

fn config() -> MatchConfig {
    MatchConfig::default().with_move_delay(Duration::ZERO)
}

fn setup<G: HardPlay>(
    config: MatchConfig,
    mode: GameMode,
    first: MoveSource,
    second: MoveSource,
) -> Match<G> {
    let mut game = Match::new(config).with_program(CENTER_PROGRAM);
    assert!(game.handle(Event::EnterSetup(mode)).is_accepted());
    assert!(game.handle(Event::Configure { mark: Mark::First, source: first }).is_accepted());
    assert!(game.handle(Event::Configure { mark: Mark::Second, source: second }).is_accepted());
    game
}

fn started<G: HardPlay>(first: MoveSource, second: MoveSource) -> Match<G> {
    let mut game = setup(config(), GameMode::Classic, first, second);
    assert!(game.handle(Event::StartGame).is_accepted());
    game
}

fn reply(position: i64) -> Result<SolverReply, SolverError> {
    Ok(SolverReply {
        selected_position: position,
        sample: None,
        explanation: None,
    })
}

/// Solver that plays back canned replies after a fixed pause
struct Scripted {
    replies: Mutex<VecDeque<Result<SolverReply, SolverError>>>,
    pause: Duration,
}

impl Scripted {
    fn new(replies: Vec<Result<SolverReply, SolverError>>, pause: Duration) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            pause,
        }
    }
}

impl Solver for Scripted {
    async fn solve(&self, _payload: &OptimizationPayload) -> Result<SolverReply, SolverError> {
        tokio::time::sleep(self.pause).await;
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(SolverError::Semantic("script exhausted".into())))
    }
}

// ============================================================================
// SOLVER TURNS
// ============================================================================

#[test]
fn test_solver_reply_places_mark_and_flips_mover() {
    let mut game: Match<TicTacToe> = started(MoveSource::Solver, MoveSource::Human);
    let Some(TurnJob::Remote(payload)) = game.begin_turn().unwrap() else {
        panic!("expected a remote job");
    };
    assert_eq!(payload.variables.len(), 9);
    assert_eq!(game.phase(), Phase::AwaitingMove(MoveSource::Solver));

    let answer = parse_reply(&json!({"return": "4"}), &payload);
    let report = game.complete_remote(answer).unwrap();
    assert_eq!(report.position, 4);
    assert_eq!(report.after, AfterMove::Continue { next: Mark::Second });
    assert_eq!(game.board().cell(4), Some(Mark::First));
    assert_eq!(game.mover(), Mark::Second);
    assert_eq!(game.phase(), Phase::Playing);
}

#[test]
fn test_program_failure_abandons_round() {
    let mut game: Match<TicTacToe> = started(MoveSource::Human, MoveSource::Solver);
    game.set_program(BROKEN_PROGRAM);
    assert!(game.handle(Event::Select(0)).is_accepted());

    let err = game.begin_turn().unwrap_err();
    assert!(matches!(err, TurnFailure::UserProgram(UserProgramError::Script(_))));
    assert_eq!(game.phase(), Phase::Setup);
    assert_eq!(game.board(), &TicTacToe::new());
    assert_eq!(game.mover(), Mark::First);
    assert_eq!(game.last_failure(), Some(&err));
    assert!(game.diagnostics().iter().any(|d| d.level == Level::Error));
}

#[test]
fn test_transport_failure_abandons_round_and_score() {
    let mut game: Match<TicTacToe> = started(MoveSource::Solver, MoveSource::Human);
    game.begin_turn().unwrap();
    let err = game
        .complete_remote(Err(SolverError::Transport("connection refused".into())))
        .unwrap_err();
    assert!(matches!(err, TurnFailure::Solver(SolverError::Transport(_))));
    assert_eq!(game.phase(), Phase::Setup);
    assert!(!game.is_locked());
    assert_eq!(game.series().wins(Mark::First), 0);
}

#[test]
fn test_occupied_reply_rejected_by_default() {
    let mut game: Match<TicTacToe> = started(MoveSource::Human, MoveSource::Solver);
    game.handle(Event::Select(4));
    game.begin_turn().unwrap();
    let err = game.complete_remote(reply(4)).unwrap_err();
    assert!(matches!(err, TurnFailure::IllegalMove { position: 4, .. }));
    assert_eq!(game.phase(), Phase::Setup);
}

#[test]
fn test_negative_reply_is_illegal() {
    let mut game: Match<TicTacToe> = started(MoveSource::Solver, MoveSource::Human);
    game.begin_turn().unwrap();
    assert!(matches!(
        game.complete_remote(reply(-1)),
        Err(TurnFailure::IllegalMove { position: -1, .. })
    ));
}

#[test]
fn test_occupied_reply_substituted_when_configured() {
    let config = config().with_occupied_policy(OccupiedPolicy::SubstituteLegal);
    let mut game: Match<TicTacToe> =
        setup(config, GameMode::Classic, MoveSource::Human, MoveSource::Solver);
    game.handle(Event::StartGame);
    game.handle(Event::Select(4));
    game.begin_turn().unwrap();

    let report = game.complete_remote(reply(4)).unwrap();
    assert_ne!(report.position, 4);
    assert_eq!(game.board().cell(report.position), Some(Mark::Second));
    assert_eq!(game.mover(), Mark::First);
    assert!(game
        .diagnostics()
        .iter()
        .any(|d| d.level == Level::Warn && d.message.contains("instead")));
}

// ============================================================================
// BOARD RULES THROUGH THE MATCH
// ============================================================================

#[test]
fn test_full_column_rejected_board_unchanged() {
    let mut game: Match<ConnectFour> = started(MoveSource::Human, MoveSource::Human);
    for _ in 0..6 {
        assert!(game.handle(Event::Select(3)).is_accepted());
    }
    let before = game.board().clone();
    let mover = game.mover();

    let response = game.handle(Event::Select(3));
    assert!(matches!(response, Response::Ignored(ref r) if r.contains("full")));
    assert_eq!(game.board(), &before);
    assert_eq!(game.mover(), mover);
    assert_eq!(game.phase(), Phase::Playing);
}

#[test]
fn test_mancala_extra_turn_keeps_mover() {
    let mut game: Match<Mancala> = started(MoveSource::Human, MoveSource::Human);
    // four seeds from pit 2 end in the store
    game.handle(Event::Select(2));
    assert_eq!(game.mover(), Mark::First);
    assert!(game.last_move().unwrap().effect.extra_turn);

    // pit 1 sows through to pit 5, so the turn passes
    game.handle(Event::Select(1));
    assert_eq!(game.mover(), Mark::Second);
    assert_eq!(game.last_move().unwrap().effect.captured, 0);
    assert_eq!(game.board().total_seeds(), 48);
}

// ============================================================================
// SERIES
// ============================================================================

fn win_round_for_first(game: &mut Match<TicTacToe>) -> AfterMove {
    for pos in [0, 3, 1, 4] {
        assert!(game.handle(Event::Select(pos)).is_accepted());
    }
    game.handle(Event::Select(2));
    game.last_move().unwrap().after
}

#[test]
fn test_best_of_three_series() {
    let mut game: Match<TicTacToe> = started(MoveSource::Human, MoveSource::Human);
    for expected_wins in 1..3 {
        let after = win_round_for_first(&mut game);
        assert_eq!(after, AfterMove::RoundOver(quboard_core::Outcome::Win(Mark::First)));
        assert_eq!(game.phase(), Phase::NextRoundReady);
        assert_eq!(game.series().wins(Mark::First), expected_wins);
        assert!(game.handle(Event::Continue).is_accepted());
        assert_eq!(game.board(), &TicTacToe::new());
    }

    assert_eq!(win_round_for_first(&mut game), AfterMove::SeriesOver(Mark::First));
    assert_eq!(game.phase(), Phase::SeriesOver { winner: Mark::First });
    assert!(!game.handle(Event::Select(5)).is_accepted());

    assert!(game.handle(Event::Continue).is_accepted());
    assert_eq!(game.phase(), Phase::Setup);
    assert_eq!(game.series().wins(Mark::First), 0);
    assert_eq!(game.series().wins(Mark::Second), 0);
}

#[test]
fn test_draw_scores_nobody() {
    let mut game: Match<TicTacToe> = started(MoveSource::Human, MoveSource::Human);
    // X O X / X O O / O X X
    for pos in [0, 1, 2, 4, 3, 5, 7, 6, 8] {
        game.handle(Event::Select(pos));
    }
    assert_eq!(game.phase(), Phase::NextRoundReady);
    assert_eq!(game.series().wins(Mark::First), 0);
    assert_eq!(game.series().wins(Mark::Second), 0);
}

#[test]
fn test_unlock_mode_gates_difficulties() {
    let config = config().with_wins_to_take_series(1);
    let mut game: Match<TicTacToe> = Match::new(config);
    game.handle(Event::EnterSetup(GameMode::Unlock));
    let locked = game.handle(Event::Configure {
        mark: Mark::Second,
        source: MoveSource::Local(Difficulty::Medium),
    });
    assert_eq!(locked, Response::Ignored("Medium is locked".into()));
    game.handle(Event::StartGame);

    // replay series until the human side takes one
    for _ in 0..10_000 {
        match game.phase() {
            Phase::SeriesOver { winner: Mark::First } => break,
            Phase::SeriesOver { .. } => {
                game.handle(Event::Continue);
                game.handle(Event::StartGame);
            }
            Phase::NextRoundReady => {
                game.handle(Event::Continue);
            }
            Phase::Playing if game.mover() == Mark::First => {
                let pos = game.board().hard_choice(Mark::First).unwrap();
                game.handle(Event::Select(pos));
            }
            Phase::Playing => {
                game.begin_turn().unwrap();
                game.complete_local().unwrap();
            }
            other => panic!("unexpected phase {:?}", other),
        }
    }
    assert_eq!(game.phase(), Phase::SeriesOver { winner: Mark::First });
    assert!(game.series().is_unlocked(Difficulty::Medium));
    assert!(!game.series().is_unlocked(Difficulty::Hard));

    game.handle(Event::Continue);
    assert!(game
        .handle(Event::Configure {
            mark: Mark::Second,
            source: MoveSource::Local(Difficulty::Medium),
        })
        .is_accepted());

    game.handle(Event::ReturnToModeSelect);
    assert!(!game.series().is_unlocked(Difficulty::Medium));
    assert_eq!(game.source(Mark::Second), MoveSource::Local(Difficulty::Easy));
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

#[test]
fn test_snapshot_restores_board_and_mover() {
    let dir = tempfile::tempdir().unwrap();
    let config = config().with_snapshot_dir(dir.path());

    let humans = (MoveSource::Human, MoveSource::Human);
    let mut first: Match<TicTacToe> = setup(config.clone(), GameMode::Classic, humans.0, humans.1);
    first.handle(Event::StartGame);
    first.handle(Event::Select(4));
    first.handle(Event::Select(0));
    first.handle(Event::Select(8));

    let mut second: Match<TicTacToe> = setup(config, GameMode::Classic, humans.0, humans.1);
    assert!(second.handle(Event::LoadSnapshot).is_accepted());
    assert_eq!(second.phase(), Phase::Playing);
    assert_eq!(second.board(), first.board());
    assert_eq!(second.mover(), Mark::Second);
    assert_eq!(second.series().wins(Mark::First), 0);

    assert!(second.handle(Event::ClearSnapshot).is_accepted());
    assert!(!second.handle(Event::LoadSnapshot).is_accepted());
}

#[test]
fn test_snapshot_disabled_without_dir() {
    let mut game: Match<TicTacToe> = started(MoveSource::Human, MoveSource::Human);
    assert_eq!(
        game.handle(Event::LoadSnapshot),
        Response::Ignored("snapshot persistence is disabled".into())
    );
}

// ============================================================================
// DRIVER
// ============================================================================

#[tokio::test]
async fn test_driver_solver_turn_ignores_events_in_flight() {
    let game: Match<TicTacToe> = Match::new(config()).with_program(CENTER_PROGRAM);
    let solver = Scripted::new(vec![reply(4)], Duration::from_millis(20));
    let (driver, tx) = MatchDriver::new(game, solver);

    for event in [
        Event::EnterSetup(GameMode::Classic),
        Event::Configure { mark: Mark::First, source: MoveSource::Solver },
        Event::Configure { mark: Mark::Second, source: MoveSource::Human },
        Event::StartGame,
        Event::Select(0),
    ] {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    let game = driver.run().await;
    assert_eq!(game.board().cell(4), Some(Mark::First));
    assert_eq!(game.board().cell(0), None);
    assert_eq!(game.mover(), Mark::Second);
    assert!(game
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("a move is being resolved")));
}

fn first_index<G>(updates: &[Update<G>], pred: impl Fn(&Update<G>) -> bool) -> usize {
    updates.iter().position(pred).unwrap()
}

#[tokio::test]
async fn test_driver_streams_updates_in_order() {
    let game: Match<TicTacToe> = Match::new(config()).with_program(CENTER_PROGRAM);
    let solver = Scripted::new(vec![reply(4)], Duration::from_millis(20));
    let (mut driver, tx) = MatchDriver::new(game, solver);
    let already_logged = driver.game().diagnostics().len();
    let mut updates = driver.subscribe();

    for event in [
        Event::EnterSetup(GameMode::Classic),
        Event::Configure { mark: Mark::First, source: MoveSource::Solver },
        Event::Configure { mark: Mark::Second, source: MoveSource::Human },
        Event::StartGame,
        Event::Select(0),
    ] {
        tx.send(event).await.unwrap();
    }
    drop(tx);
    let game = driver.run().await;

    let mut received = Vec::new();
    while let Some(update) = updates.recv().await {
        received.push(update);
    }
    let diagnostics: Vec<_> = received
        .iter()
        .filter_map(|u| match u {
            Update::Diagnostic(d) => Some(d.clone()),
            Update::Board { .. } => None,
        })
        .collect();
    assert_eq!(diagnostics, game.diagnostics()[already_logged..].to_vec());

    let setup = first_index(&received, |u| matches!(u, Update::Board { phase: Phase::Setup, .. }));
    let locked = first_index(&received, |u| {
        matches!(u, Update::Board { phase: Phase::AwaitingMove(_), .. })
    });
    let rejected = first_index(&received, |u| {
        matches!(u, Update::Diagnostic(d) if d.message.contains("a move is being resolved"))
    });
    let placed = first_index(&received, |u| {
        matches!(u, Update::Board { board, .. } if board.cell(4) == Some(Mark::First))
    });
    assert!(setup < locked && locked < rejected && rejected < placed);

    match received.last() {
        Some(Update::Board { board, mover, phase }) => {
            assert_eq!(board.cell(4), Some(Mark::First));
            assert_eq!(*mover, Mark::Second);
            assert_eq!(*phase, Phase::Playing);
        }
        other => panic!("expected a closing board update, got {:?}", other),
    }
}

#[tokio::test]
async fn test_driver_without_subscriber_still_plays() {
    let game: Match<TicTacToe> = Match::new(config());
    let (mut driver, tx) = MatchDriver::new(game, Scripted::new(vec![], Duration::ZERO));
    drop(driver.subscribe());
    for event in [
        Event::EnterSetup(GameMode::Classic),
        Event::Configure { mark: Mark::First, source: MoveSource::Local(Difficulty::Easy) },
        Event::Configure { mark: Mark::Second, source: MoveSource::Local(Difficulty::Easy) },
        Event::StartGame,
    ] {
        tx.send(event).await.unwrap();
    }
    drop(tx);
    assert_eq!(driver.run().await.phase(), Phase::NextRoundReady);
}

#[tokio::test]
async fn test_driver_plays_cpu_round_to_the_end() {
    let game: Match<TicTacToe> = Match::new(config());
    let (driver, tx) = MatchDriver::new(game, Scripted::new(vec![], Duration::ZERO));
    for event in [
        Event::EnterSetup(GameMode::Classic),
        Event::Configure { mark: Mark::First, source: MoveSource::Local(Difficulty::Hard) },
        Event::Configure { mark: Mark::Second, source: MoveSource::Local(Difficulty::Hard) },
        Event::StartGame,
    ] {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    let game = driver.run().await;
    assert_eq!(game.phase(), Phase::NextRoundReady);
    assert!(game.board().is_over());
}

#[tokio::test]
async fn test_driver_solver_failure_returns_to_setup() {
    let game: Match<TicTacToe> = Match::new(config()).with_program(CENTER_PROGRAM);
    let failure = SolverError::Server { status: Some(500), message: "boom".into() };
    let solver = Scripted::new(vec![Err(failure)], Duration::ZERO);
    let (driver, tx) = MatchDriver::new(game, solver);
    for event in [
        Event::EnterSetup(GameMode::Classic),
        Event::Configure { mark: Mark::First, source: MoveSource::Solver },
        Event::StartGame,
    ] {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    let game = driver.run().await;
    assert_eq!(game.phase(), Phase::Setup);
    assert!(matches!(game.last_failure(), Some(TurnFailure::Solver(SolverError::Server { .. }))));
}
