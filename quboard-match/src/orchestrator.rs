//! Turn orchestrator: one explicit phase value per match
//!
//! `Match` owns the board, the mover and the series. Every mutation goes
//! through `handle` (external events) or the turn API (`begin_turn`,
//! `complete_local`, `complete_remote`), and each takes `&mut self`.

use crate::config::{MatchConfig, OccupiedPolicy};
use crate::diagnostics::{Diagnostic, DiagnosticLog};
use crate::error::TurnFailure;
use crate::series::MatchSeries;
use crate::snapshot::SnapshotStore;
use crate::source::{GameMode, MoveSource};
use quboard_core::{Difficulty, Game, HardPlay, LocalOpponent, Mark, MoveEffect, Outcome};
use quboard_script::{normalize, OptimizationPayload, Sandbox};
use quboard_solver::{SolverError, SolverReply};
use tracing::debug;

// ============================================================================
// PHASES & EVENTS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    ModeSelect,
    Setup,
    /// Waiting for the mover; a human mover needs a `Select` event
    Playing,
    /// The turn lock: a non-human move is being resolved
    AwaitingMove(MoveSource),
    NextRoundReady,
    SeriesOver { winner: Mark },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    EnterSetup(GameMode),
    Configure { mark: Mark, source: MoveSource },
    StartGame,
    Select(usize),
    Continue,
    ReturnToSetup,
    ReturnToModeSelect,
    LoadSnapshot,
    ClearSnapshot,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Accepted,
    Ignored(String),
}

impl Response {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Response::Accepted)
    }
}

/// Work handed out by `begin_turn`
#[derive(Clone, Debug, PartialEq)]
pub enum TurnJob {
    Local(Difficulty),
    /// Send this payload to the solver, then call `complete_remote`
    Remote(OptimizationPayload),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AfterMove {
    Continue { next: Mark },
    /// Round finished without deciding the series
    RoundOver(Outcome),
    SeriesOver(Mark),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveReport {
    pub mark: Mark,
    pub position: usize,
    pub effect: MoveEffect,
    pub after: AfterMove,
}

// ============================================================================
// MATCH
// ============================================================================

const DEFAULT_SOURCES: [MoveSource; 2] = [MoveSource::Human, MoveSource::Local(Difficulty::Easy)];

pub struct Match<G: HardPlay> {
    config: MatchConfig,
    board: G,
    mover: Mark,
    phase: Phase,
    mode: GameMode,
    sources: [MoveSource; 2],
    series: MatchSeries,
    program: String,
    opponent: LocalOpponent,
    sandbox: Sandbox,
    store: Option<SnapshotStore>,
    log: DiagnosticLog,
    last_move: Option<MoveReport>,
    last_failure: Option<TurnFailure>,
}

impl<G: HardPlay> Match<G> {
    pub fn new(config: MatchConfig) -> Self {
        let store = config.snapshot_dir.clone().map(SnapshotStore::new);
        Self {
            board: G::default(),
            mover: Mark::First,
            phase: Phase::ModeSelect,
            mode: GameMode::default(),
            sources: DEFAULT_SOURCES,
            series: MatchSeries::new(),
            program: String::new(),
            opponent: LocalOpponent::from_config(&config.engine),
            sandbox: Sandbox::new(config.sandbox.clone()),
            store,
            log: DiagnosticLog::new(G::KIND),
            last_move: None,
            last_failure: None,
            config,
        }
    }

    /// Scoring program used for `Solver` movers
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn set_program(&mut self, program: impl Into<String>) {
        self.program = program.into();
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn board(&self) -> &G {
        &self.board
    }

    pub fn mover(&self) -> Mark {
        self.mover
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn source(&self, mark: Mark) -> MoveSource {
        self.sources[mark.index()]
    }

    pub fn series(&self) -> &MatchSeries {
        &self.series
    }

    pub fn is_locked(&self) -> bool {
        matches!(self.phase, Phase::AwaitingMove(_))
    }

    pub fn last_move(&self) -> Option<&MoveReport> {
        self.last_move.as_ref()
    }

    /// Why the last round was abandoned, until the next `StartGame`
    pub fn last_failure(&self) -> Option<&TurnFailure> {
        self.last_failure.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.log.entries()
    }

    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.log.drain()
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub fn handle(&mut self, event: Event) -> Response {
        if self.is_locked() {
            return self.ignore(format!("{:?} ignored: a move is being resolved", event));
        }
        match event {
            Event::EnterSetup(mode) => self.enter_setup(mode),
            Event::Configure { mark, source } => self.configure(mark, source),
            Event::StartGame => self.start_game(),
            Event::Select(position) => self.select(position),
            Event::Continue => self.continue_series(),
            Event::ReturnToSetup => self.return_to_setup(),
            Event::ReturnToModeSelect => self.return_to_mode_select(),
            Event::LoadSnapshot => self.load_snapshot(),
            Event::ClearSnapshot => self.clear_snapshot(),
        }
    }

    fn ignore(&mut self, reason: impl Into<String>) -> Response {
        let reason = reason.into();
        self.log.warn(reason.clone());
        Response::Ignored(reason)
    }

    fn enter_setup(&mut self, mode: GameMode) -> Response {
        if self.phase != Phase::ModeSelect {
            return self.ignore("mode can only be chosen from mode select");
        }
        self.mode = mode;
        self.phase = Phase::Setup;
        self.log.info(format!("{} mode selected", mode));
        Response::Accepted
    }

    fn configure(&mut self, mark: Mark, source: MoveSource) -> Response {
        if self.phase != Phase::Setup {
            return self.ignore("players can only be configured during setup");
        }
        if let MoveSource::Local(difficulty) = source {
            if self.mode == GameMode::Unlock && !self.series.is_unlocked(difficulty) {
                return self.ignore(format!("{} is locked", difficulty));
            }
        }
        if self.sources[mark.index()] != source {
            self.sources[mark.index()] = source;
            self.series.reset_score();
            self.log.info(format!("{} is now {}", mark, source));
        }
        Response::Accepted
    }

    fn start_game(&mut self) -> Response {
        if self.phase != Phase::Setup {
            return self.ignore("a game can only be started from setup");
        }
        if self.sources.contains(&MoveSource::Solver) && self.program.trim().is_empty() {
            return self.ignore("no program code found for the solver player");
        }
        self.last_failure = None;
        self.new_round();
        Response::Accepted
    }

    fn new_round(&mut self) {
        self.board = G::default();
        self.mover = Mark::First;
        self.last_move = None;
        self.phase = Phase::Playing;
        self.log.info(format!(
            "round started: {} vs {} (score {}-{})",
            self.sources[0],
            self.sources[1],
            self.series.wins(Mark::First),
            self.series.wins(Mark::Second)
        ));
    }

    fn select(&mut self, position: usize) -> Response {
        if self.phase != Phase::Playing {
            return self.ignore("no game in progress");
        }
        if !self.source(self.mover).is_human() {
            let reason =
                format!("it is not a human turn ({} is {})", self.mover, self.source(self.mover));
            return self.ignore(reason);
        }
        let mark = self.mover;
        match self.board.apply_move(position, mark) {
            Ok(effect) => {
                self.after_move(mark, position, effect);
                Response::Accepted
            }
            Err(e) => self.ignore(format!("{} cannot play {}: {}", mark, position, e)),
        }
    }

    fn continue_series(&mut self) -> Response {
        match self.phase {
            Phase::NextRoundReady => {
                self.new_round();
                Response::Accepted
            }
            Phase::SeriesOver { .. } => {
                self.series.reset_score();
                self.clear_board();
                self.phase = Phase::Setup;
                Response::Accepted
            }
            _ => self.ignore("nothing to continue"),
        }
    }

    fn return_to_setup(&mut self) -> Response {
        if self.phase == Phase::ModeSelect {
            return self.ignore("choose a mode first");
        }
        self.series.reset_score();
        self.clear_board();
        self.phase = Phase::Setup;
        Response::Accepted
    }

    fn return_to_mode_select(&mut self) -> Response {
        self.clear_board();
        self.sources = DEFAULT_SOURCES;
        self.series = MatchSeries::new();
        self.mode = GameMode::default();
        self.phase = Phase::ModeSelect;
        Response::Accepted
    }

    fn clear_board(&mut self) {
        self.board = G::default();
        self.mover = Mark::First;
        self.last_move = None;
    }

    fn load_snapshot(&mut self) -> Response {
        if self.phase == Phase::ModeSelect {
            return self.ignore("choose a mode first");
        }
        let Some(store) = &self.store else {
            return self.ignore("snapshot persistence is disabled");
        };
        match store.load::<G>() {
            Ok(Some(snapshot)) if snapshot.board.is_over() => {
                self.ignore("saved game is already over")
            }
            Ok(Some(snapshot)) => {
                self.board = snapshot.board;
                self.mover = snapshot.mover;
                self.last_move = None;
                self.phase = Phase::Playing;
                self.log.info(format!("saved game loaded, {} to move", self.mover));
                Response::Accepted
            }
            Ok(None) => self.ignore("no saved game"),
            Err(e) => self.ignore(format!("could not load saved game: {:#}", e)),
        }
    }

    fn clear_snapshot(&mut self) -> Response {
        let Some(store) = &self.store else {
            return self.ignore("snapshot persistence is disabled");
        };
        match store.clear::<G>() {
            Ok(true) => {
                self.log.info("saved game cleared");
                Response::Accepted
            }
            Ok(false) => self.ignore("no saved game"),
            Err(e) => self.ignore(format!("could not clear saved game: {:#}", e)),
        }
    }

    // ========================================================================
    // TURN RESOLUTION
    // ========================================================================

    /// Lock the turn for a non-human mover and say what has to be done.
    ///
    /// `Ok(None)` when nothing is pending: not playing, or a human mover.
    /// For a solver mover the scoring program runs here; a failure abandons
    /// the round before anything is sent.
    pub fn begin_turn(&mut self) -> Result<Option<TurnJob>, TurnFailure> {
        if self.phase != Phase::Playing {
            return Ok(None);
        }
        let source = self.source(self.mover);
        match source {
            MoveSource::Human => Ok(None),
            MoveSource::Local(difficulty) => {
                self.phase = Phase::AwaitingMove(source);
                Ok(Some(TurnJob::Local(difficulty)))
            }
            MoveSource::Solver => {
                self.phase = Phase::AwaitingMove(source);
                match self.build_payload() {
                    Ok(payload) => Ok(Some(TurnJob::Remote(payload))),
                    Err(failure) => Err(self.abandon(failure)),
                }
            }
        }
    }

    fn build_payload(&mut self) -> Result<OptimizationPayload, TurnFailure> {
        let outcome = self.sandbox.run(&self.program, &self.board.snapshot())?;
        for line in &outcome.trace {
            self.log.info(format!("program: {}", line));
        }
        if outcome.placeholder {
            self.log.warn("program declared no variables; using placeholder x0");
        }
        debug!(game = %G::KIND, steps = outcome.steps, shape = ?outcome.shape, "program finished");
        Ok(normalize(&outcome.payload)?)
    }

    /// Resolve a `TurnJob::Local`
    pub fn complete_local(&mut self) -> Result<MoveReport, TurnFailure> {
        let Phase::AwaitingMove(MoveSource::Local(difficulty)) = self.phase else {
            return Err(TurnFailure::NotAwaiting);
        };
        let mark = self.mover;
        let Some(position) = self.opponent.choose(&self.board, mark, difficulty) else {
            return Err(self.abandon(TurnFailure::NoMove));
        };
        match self.board.apply_move(position, mark) {
            Ok(effect) => Ok(self.after_move(mark, position, effect)),
            Err(e) => Err(self.abandon(TurnFailure::IllegalMove {
                position: position as i64,
                reason: e.to_string(),
            })),
        }
    }

    /// Resolve a `TurnJob::Remote` with the solver's answer
    pub fn complete_remote(
        &mut self,
        result: Result<SolverReply, SolverError>,
    ) -> Result<MoveReport, TurnFailure> {
        if self.phase != Phase::AwaitingMove(MoveSource::Solver) {
            return Err(TurnFailure::NotAwaiting);
        }
        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return Err(self.abandon(e.into())),
        };
        let mark = self.mover;
        let selected = reply.selected_position;
        let rejected = match usize::try_from(selected) {
            Ok(position) => match self.board.apply_move(position, mark) {
                Ok(effect) => return Ok(self.after_move(mark, position, effect)),
                Err(e) => e.to_string(),
            },
            Err(_) => "negative position".to_string(),
        };

        let failure = TurnFailure::IllegalMove {
            position: selected,
            reason: rejected,
        };
        match self.config.occupied_policy {
            OccupiedPolicy::Reject => Err(self.abandon(failure)),
            OccupiedPolicy::SubstituteLegal => {
                let Some(position) = self.opponent.random_choice(&self.board, mark) else {
                    return Err(self.abandon(TurnFailure::NoMove));
                };
                let message =
                    format!("{}; playing random legal position {} instead", failure, position);
                self.log.warn(message);
                match self.board.apply_move(position, mark) {
                    Ok(effect) => Ok(self.after_move(mark, position, effect)),
                    Err(e) => Err(self.abandon(TurnFailure::IllegalMove {
                        position: position as i64,
                        reason: e.to_string(),
                    })),
                }
            }
        }
    }

    /// Fail closed: log, drop the round and go back to setup
    fn abandon(&mut self, failure: TurnFailure) -> TurnFailure {
        self.log.error(format!("{}; round abandoned", failure));
        self.clear_board();
        self.series.reset_score();
        self.phase = Phase::Setup;
        self.last_failure = Some(failure.clone());
        failure
    }

    fn after_move(&mut self, mark: Mark, position: usize, effect: MoveEffect) -> MoveReport {
        self.log.info(format!("{} played {}", mark, position));
        if effect.captured > 0 {
            self.log.info(format!("{} captured {} seeds", mark, effect.captured));
        }

        let after = match self.board.outcome() {
            Outcome::Ongoing => {
                if effect.extra_turn {
                    self.log.info(format!("{} goes again", mark));
                } else {
                    self.mover = mark.opponent();
                }
                self.phase = Phase::Playing;
                AfterMove::Continue { next: self.mover }
            }
            Outcome::Win(winner) => {
                self.log.info(format!("{} wins the round", winner));
                if self.series.record_win(winner, self.config.wins_to_take_series) {
                    self.finish_series(winner);
                    AfterMove::SeriesOver(winner)
                } else {
                    self.phase = Phase::NextRoundReady;
                    AfterMove::RoundOver(Outcome::Win(winner))
                }
            }
            Outcome::Draw => {
                self.log.info("round drawn");
                self.phase = Phase::NextRoundReady;
                AfterMove::RoundOver(Outcome::Draw)
            }
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.board, self.mover) {
                self.log.warn(format!("could not save game: {:#}", e));
            }
        }

        let report = MoveReport {
            mark,
            position,
            effect,
            after,
        };
        self.last_move = Some(report);
        report
    }

    fn finish_series(&mut self, winner: Mark) {
        self.phase = Phase::SeriesOver { winner };
        self.log.info(format!(
            "{} takes the series {}-{}",
            winner,
            self.series.wins(winner),
            self.series.wins(winner.opponent())
        ));
        let loser = self.source(winner.opponent());
        if let Some(tier) = self.series.unlock_after(self.source(winner), loser) {
            self.log.info(format!("{} difficulty unlocked", tier));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quboard_core::TicTacToe;

    fn human_vs_human() -> Match<TicTacToe> {
        let mut game = Match::new(MatchConfig::default());
        game.handle(Event::EnterSetup(GameMode::Classic));
        game.handle(Event::Configure {
            mark: Mark::Second,
            source: MoveSource::Human,
        });
        game.handle(Event::StartGame);
        game
    }

    #[test]
    fn test_starts_in_mode_select() {
        let mut game: Match<TicTacToe> = Match::new(MatchConfig::default());
        assert_eq!(game.phase(), Phase::ModeSelect);
        assert!(!game.handle(Event::StartGame).is_accepted());
        assert!(!game.handle(Event::Select(0)).is_accepted());
    }

    #[test]
    fn test_human_moves_alternate() {
        let mut game = human_vs_human();
        assert!(game.handle(Event::Select(4)).is_accepted());
        assert_eq!(game.mover(), Mark::Second);
        assert_eq!(game.board().cell(4), Some(Mark::First));
        assert_eq!(game.begin_turn().unwrap(), None);
    }

    #[test]
    fn test_occupied_cell_is_ignored() {
        let mut game = human_vs_human();
        game.handle(Event::Select(4));
        let response = game.handle(Event::Select(4));
        assert!(matches!(response, Response::Ignored(ref r) if r.contains("occupied")));
        assert_eq!(game.mover(), Mark::Second);
        assert_eq!(game.phase(), Phase::Playing);
    }

    #[test]
    fn test_events_ignored_while_locked() {
        let mut game: Match<TicTacToe> = Match::new(MatchConfig::default());
        game.handle(Event::EnterSetup(GameMode::Classic));
        game.handle(Event::Configure {
            mark: Mark::First,
            source: MoveSource::Local(Difficulty::Hard),
        });
        game.handle(Event::StartGame);
        assert_eq!(game.begin_turn().unwrap(), Some(TurnJob::Local(Difficulty::Hard)));
        assert!(game.is_locked());
        assert!(!game.handle(Event::ReturnToModeSelect).is_accepted());
        assert!(!game.handle(Event::Select(0)).is_accepted());

        let report = game.complete_local().unwrap();
        assert_eq!(report.mark, Mark::First);
        assert!(!game.is_locked());
        assert_eq!(game.mover(), Mark::Second);
    }

    #[test]
    fn test_complete_without_begin() {
        let mut game = human_vs_human();
        assert_eq!(game.complete_local(), Err(TurnFailure::NotAwaiting));
        assert_eq!(game.phase(), Phase::Playing);
    }

    #[test]
    fn test_solver_needs_program() {
        let mut game: Match<TicTacToe> = Match::new(MatchConfig::default());
        game.handle(Event::EnterSetup(GameMode::Classic));
        game.handle(Event::Configure {
            mark: Mark::First,
            source: MoveSource::Solver,
        });
        assert!(!game.handle(Event::StartGame).is_accepted());
        assert_eq!(game.phase(), Phase::Setup);
    }

    #[test]
    fn test_return_to_setup_mid_series_resets_score() {
        let mut game = human_vs_human();
        for pos in [0, 3, 1, 4, 2] {
            game.handle(Event::Select(pos));
        }
        assert_eq!(game.phase(), Phase::NextRoundReady);
        assert_eq!(game.series().wins(Mark::First), 1);

        assert!(game.handle(Event::ReturnToSetup).is_accepted());
        assert_eq!(game.phase(), Phase::Setup);
        assert_eq!(game.series().wins(Mark::First), 0);
        assert_eq!(game.series().wins(Mark::Second), 0);

        game.drain_diagnostics();
        game.handle(Event::StartGame);
        assert!(game.diagnostics().iter().any(|d| d.message.contains("score 0-0")));
        assert_eq!(game.series().wins(Mark::First), 0);
    }
}
