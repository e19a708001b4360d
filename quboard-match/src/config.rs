//! Match configuration

use anyhow::Context;
use quboard_core::EngineConfig;
use quboard_script::SandboxConfig;
use quboard_solver::SolverConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to do when the solver picks a position the board rejects
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupiedPolicy {
    /// Abandon the round like any other solver failure
    #[default]
    Reject,
    /// Play a uniformly random legal position instead, with a warning
    SubstituteLegal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Round wins that take the series
    pub wins_to_take_series: u32,
    /// Pause before a non-human move, in milliseconds
    pub move_delay_ms: u64,
    pub occupied_policy: OccupiedPolicy,
    pub solver: SolverConfig,
    pub engine: EngineConfig,
    pub sandbox: SandboxConfig,
    /// Where board snapshots are kept; `None` disables persistence
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            wins_to_take_series: 3,
            move_delay_ms: 500,
            occupied_policy: OccupiedPolicy::Reject,
            solver: SolverConfig::default(),
            engine: EngineConfig::default(),
            sandbox: SandboxConfig::default(),
            snapshot_dir: None,
        }
    }
}

impl MatchConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading match config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing match config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("writing match config {}", path.display()))?;
        Ok(())
    }

    pub fn with_wins_to_take_series(mut self, wins: u32) -> Self {
        self.wins_to_take_series = wins.max(1);
        self
    }

    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_occupied_policy(mut self, policy: OccupiedPolicy) -> Self {
        self.occupied_policy = policy;
        self
    }

    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn move_delay(&self) -> Duration {
        Duration::from_millis(self.move_delay_ms)
    }
}
