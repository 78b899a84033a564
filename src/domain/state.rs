//! Durable engine state.
//!
//! One JSON document holds everything that must survive a restart: open
//! positions, cooldowns, the blacklist, and the snapshot history. Writes go
//! to a temp file and are renamed into place so a crash mid-write can never
//! leave a torn state file. Closed trades go to a second, append-only JSONL
//! file.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::blacklist::{BlacklistEntry, CooldownEntry, PenaltyBook};
use crate::domain::position::{ClosedTrade, Position};
use crate::domain::snapshots::SnapshotTracker;

pub const SCHEMA_VERSION: u32 = 2;
pub const STATE_FILE: &str = "state.json";
pub const HISTORY_FILE: &str = "trade_history.jsonl";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("a position for pool {0} is already open")]
    DuplicatePosition(String),
    #[error("position for pool {0} has no LP units")]
    EmptyPosition(String),
    #[error("no open position for pool {0}")]
    UnknownPosition(String),
}

/// The single guarded state value. The scheduler owns it behind one mutex.
#[derive(Debug, Default)]
pub struct AppState {
    open_positions: HashMap<String, Position>,
    pub penalties: PenaltyBook,
    pub snapshots: SnapshotTracker,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new position. At most one open position per pool, and a
    /// live position always holds LP units.
    pub fn open(&mut self, position: Position) -> Result<(), StateError> {
        if self.open_positions.contains_key(&position.pool_id) {
            return Err(StateError::DuplicatePosition(position.pool_id));
        }
        if position.entry_lp_raw == 0 {
            return Err(StateError::EmptyPosition(position.pool_id));
        }
        self.open_positions.insert(position.pool_id.clone(), position);
        Ok(())
    }

    /// Remove a position from the open set, returning it to the caller.
    /// After this returns, no reader can observe the position as open.
    pub fn take(&mut self, pool_id: &str) -> Result<Position, StateError> {
        self.open_positions
            .remove(pool_id)
            .ok_or_else(|| StateError::UnknownPosition(pool_id.to_string()))
    }

    pub fn position(&self, pool_id: &str) -> Option<&Position> {
        self.open_positions.get(pool_id)
    }

    pub fn position_mut(&mut self, pool_id: &str) -> Option<&mut Position> {
        self.open_positions.get_mut(pool_id)
    }

    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.open_positions.values()
    }

    pub fn open_count(&self) -> usize {
        self.open_positions.len()
    }

    pub fn has_position(&self, pool_id: &str) -> bool {
        self.open_positions.contains_key(pool_id)
    }

    /// Total SOL committed to open positions at entry.
    pub fn deployed_sol(&self) -> f64 {
        self.open_positions.values().map(|p| p.entry_amount_sol).sum()
    }
}

/// On-disk shape of [`AppState`].
#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    schema_version: u32,
    open_positions: Vec<Position>,
    cooldowns: Vec<CooldownEntry>,
    blacklist: Vec<BlacklistEntry>,
    #[serde(default)]
    snapshots: SnapshotTracker,
    last_saved_at: DateTime<Utc>,
}

/// What a restore found on disk.
#[derive(Debug)]
pub enum RestoreOutcome {
    /// No state file; first run.
    Fresh,
    /// State rehydrated; carries the save timestamp.
    Restored { saved_at: DateTime<Utc> },
    /// File was unreadable or from another schema; it was moved aside and the
    /// engine starts fresh.
    CorruptBackedUp { backup: PathBuf },
}

/// File-system home of the durable state.
#[derive(Debug, Clone)]
pub struct StateStore {
    data_dir: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE)
    }

    /// Serialize the full state atomically (temp file + rename).
    pub fn snapshot(&self, state: &AppState) -> Result<(), StateError> {
        fs::create_dir_all(&self.data_dir)?;
        let file = StateFile {
            schema_version: SCHEMA_VERSION,
            open_positions: state.open_positions.values().cloned().collect(),
            cooldowns: state.penalties.cooldowns().cloned().collect(),
            blacklist: state.penalties.blacklist().cloned().collect(),
            snapshots: state.snapshots.clone(),
            last_saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.state_path().with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.state_path())?;
        Ok(())
    }

    /// Load state from disk. Corrupt or schema-mismatched files are moved to
    /// a `.corrupt` backup and an empty state is returned.
    pub fn restore(&self) -> Result<(AppState, RestoreOutcome), StateError> {
        let path = self.state_path();
        if !path.exists() {
            return Ok((AppState::new(), RestoreOutcome::Fresh));
        }

        let content = fs::read_to_string(&path)?;
        let parsed: Result<StateFile, _> = serde_json::from_str(&content);
        let file = match parsed {
            Ok(file) if file.schema_version == SCHEMA_VERSION => file,
            other => {
                let why = match other {
                    Ok(file) => format!("schema version {} != {}", file.schema_version, SCHEMA_VERSION),
                    Err(e) => e.to_string(),
                };
                tracing::warn!("state file unusable ({why}); backing it up and starting fresh");
                let backup = path.with_extension("json.corrupt");
                fs::rename(&path, &backup)?;
                return Ok((AppState::new(), RestoreOutcome::CorruptBackedUp { backup }));
            }
        };

        let mut state = AppState::new();
        let saved_at = file.last_saved_at;
        for position in file.open_positions {
            if let Err(e) = state.open(position) {
                tracing::warn!("skipping restored position: {e}");
            }
        }
        state.penalties = PenaltyBook::from_parts(file.cooldowns, file.blacklist);
        state.snapshots = file.snapshots;
        Ok((state, RestoreOutcome::Restored { saved_at }))
    }

    /// Append one closed trade to the history log.
    pub fn append_trade(&self, trade: &ClosedTrade) -> Result<(), StateError> {
        fs::create_dir_all(&self.data_dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())?;
        let mut line = serde_json::to_string(trade)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read the full trade history; unparseable lines are skipped.
    pub fn load_history(&self) -> Result<Vec<ClosedTrade>, StateError> {
        let path = self.history_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(path)?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

impl StateStore {
    /// Helper used by tests and the `status` command.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ExitReason;
    use tempfile::tempdir;

    fn position(pool_id: &str) -> Position {
        Position::new(pool_id, "TOK/WSOL", "lp-mint", 9, 0.01, 1.0, 1_000_000_000, Utc::now())
    }

    #[test]
    fn open_enforces_one_per_pool() {
        let mut state = AppState::new();
        state.open(position("amm")).unwrap();
        let err = state.open(position("amm")).unwrap_err();
        assert!(matches!(err, StateError::DuplicatePosition(_)));
        assert_eq!(state.open_count(), 1);
    }

    #[test]
    fn open_rejects_zero_lp() {
        let mut state = AppState::new();
        let mut pos = position("amm");
        pos.entry_lp_raw = 0;
        assert!(matches!(
            state.open(pos),
            Err(StateError::EmptyPosition(_))
        ));
    }

    #[test]
    fn take_removes_from_open_set() {
        let mut state = AppState::new();
        state.open(position("amm")).unwrap();
        let taken = state.take("amm").unwrap();
        assert_eq!(taken.pool_id, "amm");
        assert!(!state.has_position("amm"));
        assert!(matches!(state.take("amm"), Err(StateError::UnknownPosition(_))));
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let mut state = AppState::new();
        state.open(position("amm1")).unwrap();
        state.open(position("amm2")).unwrap();
        state.penalties.record_exit(
            "cooled",
            ExitReason::StopLoss,
            &Default::default(),
            Utc::now(),
        );
        state.penalties.record_exit(
            "banned",
            ExitReason::Ghost,
            &Default::default(),
            Utc::now(),
        );
        state.snapshots.record("amm1", 100.0, 1000.0, 1.0);
        store.snapshot(&state).unwrap();

        let (restored, outcome) = store.restore().unwrap();
        assert!(matches!(outcome, RestoreOutcome::Restored { .. }));
        assert_eq!(restored.open_count(), 2);
        assert!(restored.has_position("amm1"));
        assert_eq!(restored.penalties.strikes("cooled"), 1);
        assert!(restored.penalties.is_blacklisted("banned"));
        assert_eq!(restored.snapshots.pool_count(), 1);
    }

    #[test]
    fn restore_without_file_is_fresh() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let (state, outcome) = store.restore().unwrap();
        assert!(matches!(outcome, RestoreOutcome::Fresh));
        assert_eq!(state.open_count(), 0);
    }

    #[test]
    fn corrupt_file_is_backed_up() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.state_path(), "{ not json").unwrap();

        let (state, outcome) = store.restore().unwrap();
        assert_eq!(state.open_count(), 0);
        match outcome {
            RestoreOutcome::CorruptBackedUp { backup } => assert!(backup.exists()),
            other => panic!("expected corrupt outcome, got {other:?}"),
        }
        assert!(!store.state_path().exists());
    }

    #[test]
    fn schema_mismatch_is_backed_up() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        fs::write(
            store.state_path(),
            r#"{"schema_version":1,"open_positions":[],"cooldowns":[],"blacklist":[],"last_saved_at":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let (_, outcome) = store.restore().unwrap();
        assert!(matches!(outcome, RestoreOutcome::CorruptBackedUp { .. }));
    }

    #[test]
    fn trade_log_appends_lines() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());

        let t1 = position("a").into_closed(ExitReason::StopLoss, 0.8, 150.0, Utc::now());
        let t2 = position("b").into_closed(ExitReason::TakeProfit, 1.2, 150.0, Utc::now());
        store.append_trade(&t1).unwrap();
        store.append_trade(&t2).unwrap();

        let history = store.load_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(history[1].exit_reason, ExitReason::TakeProfit);
    }

    #[test]
    fn duplicate_restored_positions_are_skipped() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path());
        let p = position("amm");
        let file = StateFile {
            schema_version: SCHEMA_VERSION,
            open_positions: vec![p.clone(), p],
            cooldowns: vec![],
            blacklist: vec![],
            snapshots: SnapshotTracker::new(),
            last_saved_at: Utc::now(),
        };
        fs::write(store.state_path(), serde_json::to_string(&file).unwrap()).unwrap();
        let (state, _) = store.restore().unwrap();
        assert_eq!(state.open_count(), 1);
    }
}
