//! Undo manager - coordinates extraction, cascades and undo state

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, warn};

use crate::backup::{BackupStore, FsBackupStore};
use crate::cascade::{self, CascadeTarget};
use crate::config::UndoConfig;
use crate::discovery::SessionLocator;
use crate::engine::{CascadeEngine, CascadeReport, Direction, OperationOutcome, StepObserver};
use crate::error::UndoError;
use crate::extractor::LogExtractor;
use crate::operation::OperationRecord;
use crate::preview::{self, Preview};
use crate::session::LocalSession;
use crate::undo_state::UndoStateTracker;

/// Where undone flags are kept for the records of a cascade
enum LedgerTarget<'a> {
    Log(&'a Path),
    Local(&'a mut LocalSession),
}

/// Marks each successful step as it finishes. A mark that cannot be saved
/// is noted on the outcome and the cascade carries on.
struct Ledger<'a> {
    tracker: &'a UndoStateTracker,
    target: LedgerTarget<'a>,
}

impl Ledger<'_> {
    async fn mark(&mut self, direction: Direction, id: &str) -> Result<(), UndoError> {
        match (&mut self.target, direction) {
            (LedgerTarget::Log(log), Direction::Undo) => self.tracker.mark_undone(id, *log).await,
            (LedgerTarget::Log(log), Direction::Redo) => self.tracker.mark_redone(id, *log).await,
            (LedgerTarget::Local(session), Direction::Undo) => {
                session.mark_undone(id).await.map(drop)
            }
            (LedgerTarget::Local(session), Direction::Redo) => {
                session.mark_redone(id).await.map(drop)
            }
        }
    }
}

#[async_trait]
impl<'a> StepObserver for Ledger<'a> {
    async fn observe(&mut self, direction: Direction, outcome: &mut OperationOutcome) {
        if !outcome.success {
            return;
        }
        if let Err(e) = self.mark(direction, &outcome.operation_id).await {
            warn!(
                direction = %direction,
                operation_id = %outcome.operation_id,
                error = %e,
                "Failed to record operation state"
            );
            outcome.persist_error = Some(e.to_string());
        }
    }
}

/// Entry point for listing, undoing and redoing recorded operations
pub struct UndoManager {
    config: UndoConfig,
    tracker: UndoStateTracker,
    extractor: LogExtractor,
    engine: CascadeEngine,
    locator: SessionLocator,
}

impl UndoManager {
    /// Manager with file-backed snapshots under `config.backup_dir`
    pub fn new(config: UndoConfig) -> Self {
        let backups = Arc::new(FsBackupStore::new(config.backup_dir.clone()));
        Self::with_backup_store(config, backups)
    }

    /// Manager writing snapshots to `backups`
    pub fn with_backup_store(config: UndoConfig, backups: Arc<dyn BackupStore>) -> Self {
        let tracker = UndoStateTracker::new(config.undo_state_path.clone());
        Self {
            extractor: LogExtractor::new(tracker.clone()),
            engine: CascadeEngine::with_default_handlers(backups),
            locator: SessionLocator::new(config.projects_dir.clone()),
            tracker,
            config,
        }
    }

    /// Create the state directories. Failure here is fatal.
    pub async fn init(&self) -> Result<(), UndoError> {
        let mut dirs: Vec<PathBuf> = vec![
            self.config.backup_dir.clone(),
            self.config.sessions_dir.clone(),
        ];
        if let Some(parent) = self.config.undo_state_path.parent() {
            dirs.push(parent.to_path_buf());
        }

        for dir in dirs {
            fs::create_dir_all(&dir).await.map_err(|e| {
                UndoError::StorageError(format!(
                    "Failed to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        debug!(backups = %self.config.backup_dir.display(), "Initialized undo manager");
        Ok(())
    }

    /// Paths this manager was built with
    pub fn config(&self) -> &UndoConfig {
        &self.config
    }

    /// Log discovery under `config.projects_dir`
    pub fn locator(&self) -> &SessionLocator {
        &self.locator
    }

    /// Undone-state file for log-sourced records
    pub fn tracker(&self) -> &UndoStateTracker {
        &self.tracker
    }

    /// Newest log for `cwd`, if the agent has one
    pub async fn current_log(&self, cwd: &Path) -> Result<Option<PathBuf>, UndoError> {
        self.locator.current_log(cwd).await
    }

    /// Records of `log` not yet undone, newest first
    pub async fn list_active(&self, log: &Path) -> Result<Vec<OperationRecord>, UndoError> {
        self.extractor.active(log).await
    }

    /// Undone records of `log`, most recently undone first
    pub async fn list_undone(&self, log: &Path) -> Result<Vec<OperationRecord>, UndoError> {
        self.extractor.undone(log).await
    }

    /// The records to process when `target` is chosen from `records`
    pub fn plan_cascade(
        &self,
        records: &[OperationRecord],
        target: &CascadeTarget,
    ) -> Result<Vec<OperationRecord>, UndoError> {
        cascade::plan_cascade(records, target)
    }

    /// Reverse a newest-first cascade taken from `log`. Each successful
    /// record is marked undone right after its step.
    pub async fn undo(
        &self,
        log: &Path,
        cascade: &[OperationRecord],
    ) -> CascadeReport {
        self.run(Direction::Undo, cascade, LedgerTarget::Log(log)).await
    }

    /// Reapply an undone cascade taken from `log`
    pub async fn redo(
        &self,
        log: &Path,
        cascade: &[OperationRecord],
    ) -> CascadeReport {
        self.run(Direction::Redo, cascade, LedgerTarget::Log(log)).await
    }

    /// Reverse a cascade of a local session's records
    pub async fn undo_local(
        &self,
        session: &mut LocalSession,
        cascade: &[OperationRecord],
    ) -> CascadeReport {
        self.run(Direction::Undo, cascade, LedgerTarget::Local(session)).await
    }

    /// Reapply a cascade of a local session's undone records
    pub async fn redo_local(
        &self,
        session: &mut LocalSession,
        cascade: &[OperationRecord],
    ) -> CascadeReport {
        self.run(Direction::Redo, cascade, LedgerTarget::Local(session)).await
    }

    /// What undoing each record of `cascade` would do
    pub async fn preview(&self, cascade: &[OperationRecord]) -> Vec<Preview> {
        let mut previews = Vec::with_capacity(cascade.len());
        for record in cascade {
            previews.push(preview::preview(record).await);
        }
        previews
    }

    async fn run(
        &self,
        direction: Direction,
        cascade: &[OperationRecord],
        target: LedgerTarget<'_>,
    ) -> CascadeReport {
        let mut ledger = Ledger {
            tracker: &self.tracker,
            target,
        };
        self.engine.run(direction, cascade, &mut ledger).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupKey, BackupPurpose, MemoryBackupStore};
    use crate::operation::{OperationKind, OperationPayload, ShellCommandData};
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn log_line(id: &str, name: &str, input: serde_json::Value) -> String {
        json!({
            "type": "assistant",
            "timestamp": "2025-06-01T10:00:00Z",
            "message": {"content": [{"type": "tool_use", "id": id, "name": name, "input": input}]}
        })
        .to_string()
    }

    async fn setup(lines: &[String]) -> (tempfile::TempDir, UndoManager, PathBuf) {
        let dir = tempdir().unwrap();
        let manager = UndoManager::new(UndoConfig::with_root(dir.path().join("state")));
        manager.init().await.unwrap();
        let log = dir.path().join("session.jsonl");
        tokio::fs::write(&log, lines.join("\n")).await.unwrap();
        (dir, manager, log)
    }

    #[tokio::test]
    async fn test_init_creates_dirs() {
        let dir = tempdir().unwrap();
        let config = UndoConfig::with_root(dir.path().join("state"));
        let manager = UndoManager::new(config.clone());
        manager.init().await.unwrap();

        assert!(config.backup_dir.is_dir());
        assert!(config.sessions_dir.is_dir());
    }

    #[tokio::test]
    async fn test_undo_then_redo_updates_views() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        let (_guard, manager, log) = setup(&[
            log_line("t1", "Write", json!({"file_path": a, "content": "one"})),
            log_line("t2", "Write", json!({"file_path": b, "content": "two"})),
        ])
        .await;
        tokio::fs::write(&a, "one").await.unwrap();
        tokio::fs::write(&b, "two").await.unwrap();

        let active = manager.list_active(&log).await.unwrap();
        assert_eq!(active[0].id(), "t2");

        let cascade = manager
            .plan_cascade(&active, &CascadeTarget::id("t1"))
            .unwrap();
        let report = manager.undo(&log, &cascade).await;
        assert_eq!(report.success_count(), 2);
        assert!(!a.exists() && !b.exists());
        assert!(manager.list_active(&log).await.unwrap().is_empty());

        let undone = manager.list_undone(&log).await.unwrap();
        let ids: Vec<_> = undone.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["t1", "t2"]);

        let redo = manager.plan_cascade(&undone, &CascadeTarget::from(0)).unwrap();
        let report = manager.redo(&log, &redo).await;
        assert!(report.all_succeeded());
        assert_eq!(tokio::fs::read_to_string(&a).await.unwrap(), "one");
        assert!(!b.exists());

        let active = manager.list_active(&log).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), "t1");
    }

    #[tokio::test]
    async fn test_failed_steps_are_not_marked() {
        let (_guard, manager, log) =
            setup(&[log_line("t1", "Bash", json!({"command": "cargo publish"}))]).await;

        let active = manager.list_active(&log).await.unwrap();
        let report = manager.undo(&log, &active).await;

        assert_eq!(report.fail_count(), 1);
        assert_eq!(manager.list_active(&log).await.unwrap().len(), 1);
        assert!(manager.list_undone(&log).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_state_does_not_abort_cascade() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        tokio::fs::write(&a, "one").await.unwrap();
        tokio::fs::write(&b, "two").await.unwrap();

        let state_dir = dir.path().join("state-is-a-dir");
        tokio::fs::create_dir(&state_dir).await.unwrap();
        let mut config = UndoConfig::with_root(dir.path().join("state"));
        config.undo_state_path = state_dir;
        let manager = UndoManager::new(config);
        manager.init().await.unwrap();

        let write = |id: &str, path: &Path, content: &str| {
            OperationRecord::new(
                id,
                Utc::now(),
                OperationPayload::FileCreate(crate::operation::FileCreateData {
                    file_path: path.to_path_buf(),
                    content: Some(content.to_string()),
                }),
            )
        };
        let cascade = vec![write("t2", &b, "two"), write("t1", &a, "one")];

        let report = manager.undo(&dir.path().join("s.jsonl"), &cascade).await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.success_count(), 2);
        assert_eq!(report.persist_failures(), 2);
        assert!(report.outcomes.iter().all(|o| o.backup.is_some()));
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn test_memory_backups() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.txt");
        let store = Arc::new(MemoryBackupStore::new());
        let manager =
            UndoManager::with_backup_store(UndoConfig::with_root(dir.path()), store.clone());
        let log = dir.path().join("s.jsonl");
        tokio::fs::write(
            &log,
            log_line("t1", "Write", json!({"file_path": file, "content": "hi"})),
        )
        .await
        .unwrap();
        tokio::fs::write(&file, "hi").await.unwrap();

        let active = manager.list_active(&log).await.unwrap();
        manager.undo(&log, &active).await;

        let key = BackupKey::new("t1", BackupPurpose::Deleted);
        assert_eq!(store.get(&key).await.unwrap(), Some(b"hi".to_vec()));
    }

    #[tokio::test]
    async fn test_local_undo_marks_inline() {
        let dir = tempdir().unwrap();
        let config = UndoConfig::with_root(dir.path());
        let manager = UndoManager::new(config.clone());
        manager.init().await.unwrap();

        let mut session = LocalSession::open(&config, Some("local".to_string()))
            .await
            .unwrap();
        let made = dir.path().join("made");
        tokio::fs::create_dir(&made).await.unwrap();
        session
            .add_operation(OperationRecord::new(
                "d1",
                Utc::now(),
                OperationPayload::DirectoryCreate(crate::operation::DirectoryData {
                    dir_path: made.clone(),
                }),
            ))
            .await
            .unwrap();
        session
            .add_operation(OperationRecord::new(
                "s1",
                Utc::now(),
                OperationPayload::ShellCommand(ShellCommandData {
                    command: "npm install".to_string(),
                }),
            ))
            .await
            .unwrap();

        let cascade = manager
            .plan_cascade(&session.active(), &CascadeTarget::id("d1"))
            .unwrap();
        let report = manager.undo_local(&mut session, &cascade).await;

        assert_eq!(report.outcomes[0].kind, OperationKind::ShellCommand);
        assert_eq!(report.success_count(), 1);
        assert!(!made.exists());
        assert!(session.get("d1").unwrap().is_undone());
        assert!(!session.get("s1").unwrap().is_undone());

        let undone = session.undone();
        let report = manager.redo_local(&mut session, &undone).await;
        assert!(report.all_succeeded());
        assert!(made.is_dir());
        assert!(session.undone().is_empty());
    }

    #[tokio::test]
    async fn test_preview_does_not_mutate() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("keep.txt");
        let (_guard, manager, log) =
            setup(&[log_line("t1", "Write", json!({"file_path": file, "content": "x"}))]).await;
        tokio::fs::write(&file, "x").await.unwrap();

        let active = manager.list_active(&log).await.unwrap();
        let previews = manager.preview(&active).await;

        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].action, crate::preview::PreviewAction::Delete);
        assert!(file.exists());
    }
}
