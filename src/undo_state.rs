//! Persisted undone-id sets, one per log
//!
//! The log itself is never edited. Which of its records count as undone is
//! decided solely by this state, keyed by the log's path.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::UndoError;
use crate::operation::OperationRecord;

/// Undone ids per log, each list in the order the ids were undone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UndoState {
    logs: BTreeMap<String, Vec<String>>,
}

impl UndoState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to the log's undone set. Returns whether anything changed.
    pub fn mark_undone(&mut self, id: &str, log: &Path) -> bool {
        let ids = self.logs.entry(log_key(log)).or_default();
        if ids.iter().any(|i| i == id) {
            return false;
        }
        ids.push(id.to_string());
        true
    }

    /// Remove `id` from the log's undone set. Returns whether anything changed.
    pub fn mark_redone(&mut self, id: &str, log: &Path) -> bool {
        let key = log_key(log);
        let Some(ids) = self.logs.get_mut(&key) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|i| i != id);
        let changed = ids.len() != before;
        if ids.is_empty() {
            self.logs.remove(&key);
        }
        changed
    }

    pub fn is_undone(&self, id: &str, log: &Path) -> bool {
        self.undone_ids(log).iter().any(|i| i == id)
    }

    /// Undone ids for a log, oldest undo first
    pub fn undone_ids(&self, log: &Path) -> &[String] {
        self.logs
            .get(&log_key(log))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Records whose id is not undone, in their original order
    pub fn filter_active(&self, records: Vec<OperationRecord>, log: &Path) -> Vec<OperationRecord> {
        let ids = self.undone_ids(log);
        records
            .into_iter()
            .filter(|r| !ids.iter().any(|i| i == r.id()))
            .map(|r| r.with_undone(false))
            .collect()
    }

    /// Records whose id is undone, most recently undone first
    pub fn undone_view(&self, records: Vec<OperationRecord>, log: &Path) -> Vec<OperationRecord> {
        let rank: HashMap<&str, usize> = self
            .undone_ids(log)
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.as_str(), pos))
            .collect();

        let mut undone: Vec<(usize, OperationRecord)> = records
            .into_iter()
            .filter_map(|r| rank.get(r.id()).map(|&pos| (pos, r.with_undone(true))))
            .collect();
        undone.sort_by(|a, b| b.0.cmp(&a.0));
        undone.into_iter().map(|(_, r)| r).collect()
    }
}

fn log_key(log: &Path) -> String {
    log.to_string_lossy().into_owned()
}

/// File-backed [`UndoState`]. Every call re-reads the file, and writes
/// happen only when the set actually changes.
#[derive(Debug, Clone)]
pub struct UndoStateTracker {
    path: PathBuf,
}

impl UndoStateTracker {
    /// Tracker backed by the JSON file at `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state; a missing file is an empty state
    pub async fn load(&self) -> Result<UndoState, UndoError> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UndoState::new()),
            Err(e) => {
                return Err(UndoError::StorageError(format!(
                    "Failed to read undo state: {}",
                    e
                )))
            }
        };

        serde_json::from_str(&json).map_err(|e| {
            UndoError::StorageError(format!("Failed to parse undo state: {}", e))
        })
    }

    /// Write `state`, creating the parent directory if needed
    pub async fn save(&self, state: &UndoState) -> Result<(), UndoError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                UndoError::StorageError(format!("Failed to create state directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, json).await.map_err(|e| {
            UndoError::StorageError(format!("Failed to write undo state: {}", e))
        })?;

        debug!(path = %self.path.display(), "Saved undo state");
        Ok(())
    }

    /// Persist `id` as undone in `log`; no write if it already was
    pub async fn mark_undone(&self, id: &str, log: &Path) -> Result<(), UndoError> {
        let mut state = self.load().await?;
        if state.mark_undone(id, log) {
            self.save(&state).await?;
        }
        Ok(())
    }

    /// Persist `id` as no longer undone in `log`; no write if it was not
    pub async fn mark_redone(&self, id: &str, log: &Path) -> Result<(), UndoError> {
        let mut state = self.load().await?;
        if state.mark_redone(id, log) {
            self.save(&state).await?;
        }
        Ok(())
    }

    /// Whether `id` is currently undone in `log`
    pub async fn is_undone(&self, id: &str, log: &Path) -> Result<bool, UndoError> {
        Ok(self.load().await?.is_undone(id, log))
    }

    /// [`UndoState::filter_active`] against the persisted state
    pub async fn filter_active(
        &self,
        records: Vec<OperationRecord>,
        log: &Path,
    ) -> Result<Vec<OperationRecord>, UndoError> {
        Ok(self.load().await?.filter_active(records, log))
    }

    /// [`UndoState::undone_view`] against the persisted state
    pub async fn undone_view(
        &self,
        records: Vec<OperationRecord>,
        log: &Path,
    ) -> Result<Vec<OperationRecord>, UndoError> {
        Ok(self.load().await?.undone_view(records, log))
    }
}
