//! Per-kind reverse/apply handlers
//!
//! Each [`OperationKind`] has exactly one handler in the registry. Adding a
//! kind means adding a handler; the engines and the state tracker do not
//! change.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;

use crate::backup::{BackupKey, BackupPurpose, BackupRef, BackupStore};
use crate::error::{ReversalError, UndoError};
use crate::operation::{EditMode, OperationKind, OperationPayload, OperationRecord};

/// A mutation that went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub message: String,
    pub backup: Option<BackupRef>,
}

impl Applied {
    fn new(message: String) -> Self {
        Self {
            message,
            backup: None,
        }
    }

    fn with_backup(mut self, backup: BackupRef) -> Self {
        self.backup = Some(backup);
        self
    }
}

/// Reverse (undo) and forward (redo) for one kind
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn reverse(
        &self,
        record: &OperationRecord,
        backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError>;

    async fn apply(
        &self,
        record: &OperationRecord,
        backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError>;
}

/// Handlers keyed by kind
pub struct HandlerRegistry {
    handlers: HashMap<OperationKind, Box<dyn OperationHandler>>,
}

impl HandlerRegistry {
    /// A registry with no handlers
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Install `handler` for `kind`, replacing any earlier one
    pub fn register(&mut self, kind: OperationKind, handler: Box<dyn OperationHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: OperationKind) -> Option<&dyn OperationHandler> {
        self.handlers.get(&kind).map(|h| h.as_ref())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(OperationKind::FileCreate, Box::new(FileCreateHandler));
        registry.register(OperationKind::FileEdit, Box::new(FileEditHandler));
        registry.register(OperationKind::FileDelete, Box::new(FileDeleteHandler));
        registry.register(OperationKind::FileRename, Box::new(FileRenameHandler));
        registry.register(OperationKind::DirectoryCreate, Box::new(DirectoryCreateHandler));
        registry.register(OperationKind::DirectoryDelete, Box::new(DirectoryDeleteHandler));
        registry.register(OperationKind::ShellCommand, Box::new(ShellCommandHandler));
        registry
    }
}

macro_rules! expect_payload {
    ($record:expr, $variant:ident) => {
        match $record.payload() {
            OperationPayload::$variant(data) => data,
            _ => return Err(mismatch($record)),
        }
    };
}

fn mismatch(record: &OperationRecord) -> ReversalError {
    ReversalError::Unsupported(format!(
        "No handler accepts {} payload of {}",
        record.kind(),
        record.id()
    ))
}

fn storage_failure(context: &str, err: UndoError) -> ReversalError {
    ReversalError::io(context, std::io::Error::other(err.to_string()))
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

async fn snapshot(
    backups: &dyn BackupStore,
    record: &OperationRecord,
    purpose: BackupPurpose,
    bytes: &[u8],
    context: &str,
) -> Result<BackupRef, ReversalError> {
    backups
        .put(&BackupKey::new(record.id(), purpose), bytes)
        .await
        .map_err(|e| storage_failure(context, e))
}

fn replace(haystack: &str, from: &str, to: &str, all: bool) -> String {
    if all {
        haystack.replace(from, to)
    } else {
        haystack.replacen(from, to, 1)
    }
}

struct FileCreateHandler;

#[async_trait]
impl OperationHandler for FileCreateHandler {
    async fn reverse(
        &self,
        record: &OperationRecord,
        backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        const CONTEXT: &str = "Failed to undo file creation";
        let data = expect_payload!(record, FileCreate);
        let path = &data.file_path;

        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReversalError::ContentUnavailable(format!(
                    "Cannot undo file creation: {} no longer exists",
                    path.display()
                )))
            }
            Err(e) => return Err(ReversalError::io(CONTEXT, e)),
        };
        let backup = snapshot(backups, record, BackupPurpose::Deleted, &content, CONTEXT).await?;
        fs::remove_file(path)
            .await
            .map_err(|e| ReversalError::io(CONTEXT, e))?;

        Ok(Applied::new(format!("File deleted: {}", path.display())).with_backup(backup))
    }

    async fn apply(
        &self,
        record: &OperationRecord,
        backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        const CONTEXT: &str = "Failed to redo file creation";
        let data = expect_payload!(record, FileCreate);
        let path = &data.file_path;

        if exists(path).await {
            return Err(ReversalError::AlreadyExists(format!(
                "Cannot redo file creation: {} already exists",
                path.display()
            )));
        }

        let key = BackupKey::new(record.id(), BackupPurpose::Deleted);
        let content = match backups.get(&key).await.map_err(|e| storage_failure(CONTEXT, e))? {
            Some(bytes) => bytes,
            None => match &data.content {
                Some(content) => content.clone().into_bytes(),
                None => {
                    return Err(ReversalError::ContentUnavailable(format!(
                        "Cannot redo file creation: no content available for {}",
                        path.display()
                    )))
                }
            },
        };
        fs::write(path, content)
            .await
            .map_err(|e| ReversalError::io(CONTEXT, e))?;

        Ok(Applied::new(format!("File recreated: {}", path.display())))
    }
}

struct FileEditHandler;

#[async_trait]
impl OperationHandler for FileEditHandler {
    async fn reverse(
        &self,
        record: &OperationRecord,
        backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        const CONTEXT: &str = "Failed to undo file edit";
        let data = expect_payload!(record, FileEdit);
        let path = &data.file_path;

        let current = fs::read_to_string(path)
            .await
            .map_err(|e| ReversalError::io(CONTEXT, e))?;

        let reverted = match data.mode() {
            EditMode::Legacy { original } => original.to_string(),
            EditMode::Multi(edits) => {
                let mut content = current.clone();
                for edit in edits.iter().rev() {
                    if edit.new_string.is_empty() || !content.contains(&edit.new_string) {
                        continue;
                    }
                    content = replace(&content, &edit.new_string, &edit.old_string, edit.replace_all);
                }
                content
            }
            EditMode::Single {
                old,
                new,
                replace_all,
            } if !new.is_empty() => {
                if !replace_all && !current.contains(new) {
                    return Err(ReversalError::NotFound(format!(
                        "Cannot undo edit: expected string not found in {}",
                        path.display()
                    )));
                }
                replace(&current, new, old, replace_all)
            }
            _ => {
                return Err(ReversalError::ContentUnavailable(format!(
                    "Cannot undo file edit: insufficient data for {}",
                    path.display()
                )))
            }
        };

        let backup = snapshot(
            backups,
            record,
            BackupPurpose::Current,
            current.as_bytes(),
            CONTEXT,
        )
        .await?;
        fs::write(path, reverted)
            .await
            .map_err(|e| ReversalError::io(CONTEXT, e))?;

        Ok(Applied::new(format!("File edit reverted: {}", path.display())).with_backup(backup))
    }

    async fn apply(
        &self,
        record: &OperationRecord,
        backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        const CONTEXT: &str = "Failed to redo file edit";
        let data = expect_payload!(record, FileEdit);
        let path = &data.file_path;

        let current = fs::read_to_string(path)
            .await
            .map_err(|e| ReversalError::io(CONTEXT, e))?;

        let redone = if data.is_multi_edit {
            let mut content = current.clone();
            for edit in &data.edits {
                if edit.old_string.is_empty() || !content.contains(&edit.old_string) {
                    continue;
                }
                content = replace(&content, &edit.old_string, &edit.new_string, edit.replace_all);
            }
            content
        } else {
            match (&data.old_string, &data.new_string) {
                (Some(old), Some(new)) if !old.is_empty() => {
                    if !data.replace_all && !current.contains(old.as_str()) {
                        return Err(ReversalError::NotFound(format!(
                            "Cannot redo edit: original string not found in {}",
                            path.display()
                        )));
                    }
                    replace(&current, old, new, data.replace_all)
                }
                _ if data.original_content.is_some() => {
                    return Err(ReversalError::ContentUnavailable(format!(
                        "Cannot redo legacy file edit: insufficient data for {}",
                        path.display()
                    )))
                }
                _ => {
                    return Err(ReversalError::ContentUnavailable(format!(
                        "Cannot redo file edit: insufficient data for {}",
                        path.display()
                    )))
                }
            }
        };

        let backup = snapshot(backups, record, BackupPurpose::Redo, current.as_bytes(), CONTEXT).await?;
        fs::write(path, redone)
            .await
            .map_err(|e| ReversalError::io(CONTEXT, e))?;

        Ok(Applied::new(format!("File edit redone: {}", path.display())).with_backup(backup))
    }
}

struct FileDeleteHandler;

#[async_trait]
impl OperationHandler for FileDeleteHandler {
    async fn reverse(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, FileDelete);
        let path = &data.file_path;

        let Some(content) = &data.content else {
            return Err(ReversalError::ContentUnavailable(format!(
                "Cannot restore file: content not available for {}",
                path.display()
            )));
        };
        fs::write(path, content)
            .await
            .map_err(|e| ReversalError::io("Failed to restore file", e))?;

        Ok(Applied::new(format!("File restored: {}", path.display())))
    }

    async fn apply(
        &self,
        record: &OperationRecord,
        backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        const CONTEXT: &str = "Failed to redo file deletion";
        let data = expect_payload!(record, FileDelete);
        let path = &data.file_path;

        if !exists(path).await {
            return Err(ReversalError::NotFound(format!(
                "Cannot redo file deletion: {} does not exist",
                path.display()
            )));
        }

        let content = fs::read(path)
            .await
            .map_err(|e| ReversalError::io(CONTEXT, e))?;
        let backup = snapshot(backups, record, BackupPurpose::RedoDeleted, &content, CONTEXT).await?;
        fs::remove_file(path)
            .await
            .map_err(|e| ReversalError::io(CONTEXT, e))?;

        Ok(Applied::new(format!("File deleted again: {}", path.display())).with_backup(backup))
    }
}

struct FileRenameHandler;

#[async_trait]
impl OperationHandler for FileRenameHandler {
    async fn reverse(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, FileRename);

        fs::rename(&data.new_path, &data.old_path)
            .await
            .map_err(|e| ReversalError::io("Failed to undo rename", e))?;

        Ok(Applied::new(format!(
            "File renamed back: {} -> {}",
            data.new_path.display(),
            data.old_path.display()
        )))
    }

    async fn apply(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, FileRename);

        if !exists(&data.old_path).await {
            return Err(ReversalError::NotFound(format!(
                "Cannot redo rename: {} does not exist",
                data.old_path.display()
            )));
        }
        if exists(&data.new_path).await {
            return Err(ReversalError::AlreadyExists(format!(
                "Cannot redo rename: {} already exists",
                data.new_path.display()
            )));
        }

        fs::rename(&data.old_path, &data.new_path)
            .await
            .map_err(|e| ReversalError::io("Failed to redo rename", e))?;

        Ok(Applied::new(format!(
            "File renamed again: {} -> {}",
            data.old_path.display(),
            data.new_path.display()
        )))
    }
}

struct DirectoryCreateHandler;

#[async_trait]
impl OperationHandler for DirectoryCreateHandler {
    async fn reverse(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, DirectoryCreate);

        // non-recursive: a directory with contents is left alone
        fs::remove_dir(&data.dir_path)
            .await
            .map_err(|e| ReversalError::io("Failed to remove directory", e))?;

        Ok(Applied::new(format!(
            "Directory removed: {}",
            data.dir_path.display()
        )))
    }

    async fn apply(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, DirectoryCreate);

        if exists(&data.dir_path).await {
            return Err(ReversalError::AlreadyExists(format!(
                "Cannot redo directory creation: {} already exists",
                data.dir_path.display()
            )));
        }
        fs::create_dir_all(&data.dir_path)
            .await
            .map_err(|e| ReversalError::io("Failed to redo directory creation", e))?;

        Ok(Applied::new(format!(
            "Directory created again: {}",
            data.dir_path.display()
        )))
    }
}

struct DirectoryDeleteHandler;

#[async_trait]
impl OperationHandler for DirectoryDeleteHandler {
    async fn reverse(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, DirectoryDelete);

        // contents were never captured; only the directory comes back
        fs::create_dir_all(&data.dir_path)
            .await
            .map_err(|e| ReversalError::io("Failed to restore directory", e))?;

        Ok(Applied::new(format!(
            "Directory restored: {}",
            data.dir_path.display()
        )))
    }

    async fn apply(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, DirectoryDelete);

        if !exists(&data.dir_path).await {
            return Err(ReversalError::NotFound(format!(
                "Cannot redo directory deletion: {} does not exist",
                data.dir_path.display()
            )));
        }
        fs::remove_dir(&data.dir_path)
            .await
            .map_err(|e| ReversalError::io("Failed to redo directory deletion", e))?;

        Ok(Applied::new(format!(
            "Directory deleted again: {}",
            data.dir_path.display()
        )))
    }
}

struct ShellCommandHandler;

#[async_trait]
impl OperationHandler for ShellCommandHandler {
    async fn reverse(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, ShellCommand);
        Err(ReversalError::Unsupported(format!(
            "Cannot auto-undo bash command: {}\nPlease manually revert any changes.",
            data.command
        )))
    }

    async fn apply(
        &self,
        record: &OperationRecord,
        _backups: &dyn BackupStore,
    ) -> Result<Applied, ReversalError> {
        let data = expect_payload!(record, ShellCommand);
        Err(ReversalError::Unsupported(format!(
            "Cannot redo bash command: {}\nPlease manually re-run the command.",
            data.command
        )))
    }
}
