//! End-to-end undo/redo against a real log and a scratch directory

use std::path::{Path, PathBuf};

use burrow::{
    BackupKey, BackupPurpose, BackupStore, CascadeTarget, FailureKind, FsBackupStore, HookInput,
    LocalSession, OperationKind, UndoConfig, UndoManager,
};
use serde_json::{json, Value};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    manager: UndoManager,
    log: PathBuf,
}

impl Workspace {
    async fn new(calls: &[(&str, &str, Value)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let manager = UndoManager::new(UndoConfig::with_root(dir.path().join(".burrow")));
        manager.init().await.unwrap();

        let lines: Vec<String> = calls
            .iter()
            .enumerate()
            .map(|(i, (id, name, input))| {
                json!({
                    "type": "assistant",
                    "timestamp": format!("2025-06-01T10:00:{:02}Z", i),
                    "message": {"content": [
                        {"type": "text", "text": "working"},
                        {"type": "tool_use", "id": id, "name": name, "input": input}
                    ]}
                })
                .to_string()
            })
            .collect();
        let log = dir.path().join("session.jsonl");
        tokio::fs::write(&log, lines.join("\n")).await.unwrap();

        Self { dir, manager, log }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn backups(&self) -> FsBackupStore {
        FsBackupStore::new(self.manager.config().backup_dir.clone())
    }
}

async fn read(path: &Path) -> String {
    tokio::fs::read_to_string(path).await.unwrap()
}

#[tokio::test]
async fn undo_write_deletes_file_and_keeps_backup() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.txt");
    let ws = Workspace::new(&[(
        "toolu_a",
        "Write",
        json!({"file_path": file, "content": "hello"}),
    )])
    .await;
    tokio::fs::write(&file, "hello").await.unwrap();

    let active = ws.manager.list_active(&ws.log).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].kind(), OperationKind::FileCreate);

    let report = ws.manager.undo(&ws.log, &active).await;
    assert!(report.all_succeeded());
    assert!(!file.exists());

    let backup = ws
        .backups()
        .get(&BackupKey::new("toolu_a", BackupPurpose::Deleted))
        .await
        .unwrap();
    assert_eq!(backup, Some(b"hello".to_vec()));
}

#[tokio::test]
async fn edit_undo_and_redo() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("lib.rs");
    let ws = Workspace::new(&[(
        "toolu_e",
        "Edit",
        json!({"file_path": file, "old_string": "foo", "new_string": "bar"}),
    )])
    .await;
    tokio::fs::write(&file, "bar").await.unwrap();

    let active = ws.manager.list_active(&ws.log).await.unwrap();
    let report = ws.manager.undo(&ws.log, &active).await;
    assert!(report.all_succeeded());
    assert_eq!(read(&file).await, "foo");

    let undone = ws.manager.list_undone(&ws.log).await.unwrap();
    assert_eq!(undone.len(), 1);
    assert!(undone[0].is_undone());

    let report = ws.manager.redo(&ws.log, &undone).await;
    assert!(report.all_succeeded());
    assert_eq!(read(&file).await, "bar");
    assert!(ws.manager.list_undone(&ws.log).await.unwrap().is_empty());
}

#[tokio::test]
async fn cascade_runs_newest_first_and_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("c.txt");
    let ws = Workspace::new(&[
        ("t1", "Write", json!({"file_path": file, "content": "v1"})),
        (
            "t2",
            "Edit",
            json!({"file_path": file, "old_string": "v1", "new_string": "v2"}),
        ),
        (
            "t3",
            "Bash",
            json!({"command": format!("rm {}", file.display())}),
        ),
    ])
    .await;

    let active = ws.manager.list_active(&ws.log).await.unwrap();
    let cascade = ws
        .manager
        .plan_cascade(&active, &CascadeTarget::id("t1"))
        .unwrap();
    let kinds: Vec<_> = cascade.iter().map(|r| r.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::FileDelete,
            OperationKind::FileEdit,
            OperationKind::FileCreate
        ]
    );

    // the log never carries deleted content, so every step fails but all run
    let report = ws.manager.undo(&ws.log, &cascade).await;
    let order: Vec<_> = report.outcomes.iter().map(|o| o.operation_id.as_str()).collect();
    assert_eq!(order, vec!["t3", "t2", "t1"]);
    let failures: Vec<_> = report.outcomes.iter().map(|o| o.failure).collect();
    assert_eq!(
        failures,
        vec![
            Some(FailureKind::ContentUnavailable),
            Some(FailureKind::Io),
            Some(FailureKind::ContentUnavailable),
        ]
    );
    assert!(!file.exists());
    assert_eq!(ws.manager.list_active(&ws.log).await.unwrap().len(), 3);
}

#[tokio::test]
async fn hook_tracked_cascade_on_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("c.txt");
    let config = UndoConfig::with_root(dir.path().join(".burrow"));
    let manager = UndoManager::new(config.clone());
    manager.init().await.unwrap();
    let mut session = LocalSession::open(&config, None).await.unwrap();

    let hook = |tool: &str, parameters: Value| HookInput {
        tool: tool.to_string(),
        parameters,
    };
    session
        .track_tool_call(&hook("Write", json!({"file_path": file, "content": "v1"})))
        .await
        .unwrap();
    tokio::fs::write(&file, "v1").await.unwrap();
    session
        .track_tool_call(&hook(
            "Edit",
            json!({"file_path": file, "old_string": "v1", "new_string": "v2"}),
        ))
        .await
        .unwrap();
    tokio::fs::write(&file, "v2").await.unwrap();
    session
        .track_tool_call(&hook(
            "Bash",
            json!({"command": format!("rm {}", file.display())}),
        ))
        .await
        .unwrap();
    tokio::fs::remove_file(&file).await.unwrap();

    let active = session.active();
    let cascade = manager.plan_cascade(&active, &CascadeTarget::Index(2)).unwrap();
    let kinds: Vec<_> = cascade.iter().map(|r| r.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            OperationKind::FileDelete,
            OperationKind::FileEdit,
            OperationKind::FileCreate
        ]
    );

    let report = manager.undo_local(&mut session, &cascade).await;
    assert!(report.all_succeeded(), "{:?}", report);
    assert!(!file.exists());
    assert!(session.active().is_empty());

    let undone = session.undone();
    let report = manager.redo_local(&mut session, &undone).await;
    assert!(report.all_succeeded(), "{:?}", report);
    assert!(!file.exists());
}

#[tokio::test]
async fn shell_command_needs_manual_revert() {
    let ws = Workspace::new(&[("toolu_git", "Bash", json!({"command": "git commit -m x"}))]).await;
    let marker = ws.path("untouched.txt");
    tokio::fs::write(&marker, "same").await.unwrap();

    let active = ws.manager.list_active(&ws.log).await.unwrap();
    assert_eq!(active[0].kind(), OperationKind::ShellCommand);

    let report = ws.manager.undo(&ws.log, &active).await;
    let outcome = &report.outcomes[0];
    assert!(!outcome.success);
    assert_eq!(outcome.failure, Some(FailureKind::Unsupported));
    assert!(outcome.message.contains("manually"));
    assert_eq!(read(&marker).await, "same");
    assert_eq!(ws.manager.list_active(&ws.log).await.unwrap().len(), 1);
}

#[tokio::test]
async fn undo_state_survives_a_new_manager() {
    let dir = tempfile::tempdir().unwrap();
    let made = dir.path().join("made");
    let ws = Workspace::new(&[(
        "t1",
        "Bash",
        json!({"command": format!("mkdir -p {}", made.display())}),
    )])
    .await;
    tokio::fs::create_dir(&made).await.unwrap();

    let active = ws.manager.list_active(&ws.log).await.unwrap();
    let report = ws.manager.undo(&ws.log, &active).await;
    assert_eq!(report.persist_failures(), 0);
    assert!(!made.exists());

    let reopened = UndoManager::new(ws.manager.config().clone());
    assert!(reopened.list_active(&ws.log).await.unwrap().is_empty());
    assert_eq!(reopened.list_undone(&ws.log).await.unwrap()[0].id(), "t1");
}

#[tokio::test]
async fn unknown_target_is_fatal() {
    let ws = Workspace::new(&[("t1", "Bash", json!({"command": "ls"}))]).await;
    let active = ws.manager.list_active(&ws.log).await.unwrap();

    assert!(ws
        .manager
        .plan_cascade(&active, &CascadeTarget::id("nope"))
        .is_err());
    assert!(ws
        .manager
        .plan_cascade(&active, &CascadeTarget::Index(1))
        .is_err());
}

#[tokio::test]
async fn missing_log_is_fatal() {
    let ws = Workspace::new(&[]).await;
    let missing = ws.path("missing.jsonl");
    assert!(matches!(
        ws.manager.list_active(&missing).await,
        Err(burrow::UndoError::LogUnreadable { .. })
    ));
}
