//! Board persistence, one JSON file per game kind

use anyhow::Context;
use quboard_core::{Game, Mark};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Saved board plus whose turn it is. Series and lock are session-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<G> {
    pub board: G,
    pub mover: Mark,
}

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for<G: Game>(&self) -> PathBuf {
        self.dir.join(format!("{}.json", G::KIND.slug()))
    }

    pub fn save<G: Game>(&self, board: &G, mover: Mark) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating snapshot dir {}", self.dir.display()))?;
        let path = self.path_for::<G>();
        let snapshot = Snapshot {
            board: board.clone(),
            mover,
        };
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(&path, content)
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        Ok(())
    }

    /// `Ok(None)` when nothing has been saved for this game
    pub fn load<G: Game>(&self) -> anyhow::Result<Option<Snapshot<G>>> {
        let path = self.path_for::<G>();
        if !path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&path)
                .with_context(|| format!("reading snapshot {}", path.display()))?;
        let snapshot =
            serde_json::from_str(&content)
                .with_context(|| format!("parsing snapshot {}", path.display()))?;
        Ok(Some(snapshot))
    }

    /// Remove the saved snapshot; true if one existed
    pub fn clear<G: Game>(&self) -> anyhow::Result<bool> {
        let path = self.path_for::<G>();
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("removing snapshot {}", path.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quboard_core::{ConnectFour, Mancala, TicTacToe};

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("snaps"));
        assert!(store.load::<TicTacToe>().unwrap().is_none());

        let board = TicTacToe::from_picture("X.. .O. ...");
        store.save(&board, Mark::First).unwrap();
        let loaded = store.load::<TicTacToe>().unwrap().unwrap();
        assert_eq!(loaded.mover, Mark::First);
        assert_eq!(loaded.board.snapshot(), board.snapshot());

        assert!(store.clear::<TicTacToe>().unwrap());
        assert!(!store.clear::<TicTacToe>().unwrap());
    }

    #[test]
    fn test_one_file_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&ConnectFour::new(), Mark::Second).unwrap();
        store.save(&Mancala::new(), Mark::First).unwrap();
        assert!(store.path_for::<ConnectFour>().ends_with("connect4.json"));
        assert_eq!(store.load::<ConnectFour>().unwrap().unwrap().mover, Mark::Second);
        assert!(store.load::<TicTacToe>().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(store.path_for::<Mancala>(), "not json").unwrap();
        let err = store.load::<Mancala>().unwrap_err();
        assert!(format!("{:#}", err).contains("parsing snapshot"));
    }
}
