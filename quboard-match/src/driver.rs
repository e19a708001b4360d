//! Async driver: feeds events to a `Match` and resolves non-human turns
//!
//! Subscribers get every new diagnostic and a board snapshot after each
//! handled event and each resolved turn.

use crate::diagnostics::Diagnostic;
use crate::orchestrator::{Event, Match, MoveReport, Phase, Response, TurnJob};
use quboard_core::{HardPlay, Mark};
use quboard_solver::Solver;
use std::future::Future;
use tokio::sync::mpsc;
use tracing::debug;

/// Events queued before a driver starts draining
pub const EVENT_BUFFER: usize = 64;

/// Outbound message for the presentation layer
#[derive(Clone, Debug, PartialEq)]
pub enum Update<G> {
    Diagnostic(Diagnostic),
    Board { board: G, mover: Mark, phase: Phase },
}

/// Sends only the log entries a subscriber has not seen yet
struct Outbox<G> {
    tx: Option<mpsc::UnboundedSender<Update<G>>>,
    sent: usize,
}

impl<G: HardPlay> Outbox<G> {
    fn publish(&mut self, game: &Match<G>) {
        let Some(tx) = &self.tx else {
            return;
        };
        let entries = game.diagnostics();
        let fresh = entries.get(self.sent..).unwrap_or_default();
        let mut delivered = true;
        for entry in fresh {
            delivered &= tx.send(Update::Diagnostic(entry.clone())).is_ok();
        }
        self.sent = entries.len();
        delivered &= tx
            .send(Update::Board {
                board: game.board().clone(),
                mover: game.mover(),
                phase: game.phase(),
            })
            .is_ok();
        if !delivered {
            debug!("update subscriber closed");
            self.tx = None;
        }
    }
}

pub struct MatchDriver<G: HardPlay, S: Solver> {
    game: Match<G>,
    solver: S,
    events: mpsc::Receiver<Event>,
    open: bool,
    outbox: Outbox<G>,
}

impl<G: HardPlay, S: Solver> MatchDriver<G, S> {
    /// Driver plus the sender the presentation layer pushes events into
    pub fn new(game: Match<G>, solver: S) -> (Self, mpsc::Sender<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let sent = game.diagnostics().len();
        let driver = Self {
            game,
            solver,
            events: rx,
            open: true,
            outbox: Outbox { tx: None, sent },
        };
        (driver, tx)
    }

    /// Receiver for diagnostics and board snapshots. A later call replaces
    /// the earlier subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Update<G>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbox = Outbox {
            tx: Some(tx),
            sent: self.game.diagnostics().len(),
        };
        rx
    }

    pub fn game(&self) -> &Match<G> {
        &self.game
    }

    /// Run until every sender is dropped and no non-human turn is pending
    pub async fn run(mut self) -> Match<G> {
        loop {
            while self.play_turn().await.is_some() {}
            if !self.open {
                break;
            }
            match self.events.recv().await {
                Some(event) => {
                    self.game.handle(event);
                    self.outbox.publish(&self.game);
                }
                None => self.open = false,
            }
        }
        self.game
    }

    /// Resolve one pending non-human turn, if any.
    ///
    /// Events that arrive meanwhile are handed to the match, which ignores
    /// them while the turn is locked.
    pub async fn play_turn(&mut self) -> Option<MoveReport> {
        let job = match self.game.begin_turn() {
            Ok(Some(job)) => job,
            Ok(None) => return None,
            Err(_) => {
                self.outbox.publish(&self.game);
                return None;
            }
        };
        self.outbox.publish(&self.game);
        let delay = self.game.config().move_delay();
        let mut turn = Turn {
            game: &mut self.game,
            events: &mut self.events,
            open: &mut self.open,
            outbox: &mut self.outbox,
        };
        if !delay.is_zero() {
            turn.drain_while(tokio::time::sleep(delay)).await;
        }
        let result = match job {
            TurnJob::Local(_) => self.game.complete_local(),
            TurnJob::Remote(payload) => {
                let reply = turn.drain_while(self.solver.solve(&payload)).await;
                self.game.complete_remote(reply)
            }
        };
        self.outbox.publish(&self.game);
        result.ok()
    }
}

/// Borrowed driver state while a turn is locked
struct Turn<'a, G: HardPlay> {
    game: &'a mut Match<G>,
    events: &'a mut mpsc::Receiver<Event>,
    open: &'a mut bool,
    outbox: &'a mut Outbox<G>,
}

impl<G: HardPlay> Turn<'_, G> {
    async fn drain_while<F: Future>(&mut self, work: F) -> F::Output {
        tokio::pin!(work);
        loop {
            tokio::select! {
                output = &mut work => return output,
                event = self.events.recv(), if *self.open => match event {
                    Some(event) => {
                        if let Response::Ignored(reason) = self.game.handle(event) {
                            debug!(%reason, "event during turn");
                        }
                        self.outbox.publish(self.game);
                    }
                    None => *self.open = false,
                },
            }
        }
    }
}
