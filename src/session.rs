//! Locally tracked sessions
//!
//! Instead of re-reading an agent log, a tool hook can feed every call into
//! a session file owned by this crate. Such records may carry full pre-edit
//! content, and their `undone` flag is stored inline.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::UndoConfig;
use crate::error::UndoError;
use crate::operation::{
    DirectoryData, EditPair, FileCreateData, FileDeleteData, FileEditData, FileRenameData,
    OperationPayload, OperationRecord, ShellCommandData,
};
use crate::shell::{self, ShellAction};

/// Payload a tool hook receives: `{tool, parameters}`
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Default, Deserialize)]
struct HookParameters {
    file_path: Option<String>,
    content: Option<String>,
    #[serde(default)]
    old_string: String,
    #[serde(default)]
    new_string: String,
    #[serde(default)]
    replace_all: bool,
    #[serde(default)]
    edits: Vec<EditPair>,
    command: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionFile {
    session_id: String,
    operations: Vec<OperationRecord>,
}

/// A session file with its records held in memory
#[derive(Debug)]
pub struct LocalSession {
    id: String,
    path: PathBuf,
    operations: Vec<OperationRecord>,
}

impl LocalSession {
    /// Open (or start) a session. Without an id a new one is generated.
    pub async fn open(config: &UndoConfig, session_id: Option<String>) -> Result<Self, UndoError> {
        fs::create_dir_all(&config.sessions_dir).await.map_err(|e| {
            UndoError::StorageError(format!("Failed to create sessions directory: {}", e))
        })?;

        let id = session_id.unwrap_or_else(Self::new_session_id);
        let path = config.sessions_dir.join(format!("{}.json", id));
        let mut session = Self {
            id,
            path,
            operations: Vec::new(),
        };
        session.load().await?;
        Ok(session)
    }

    /// Timestamp-derived id, e.g. `2025-06-01T10-00-00-000Z`
    pub fn new_session_id() -> String {
        Utc::now()
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-")
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&mut self) -> Result<(), UndoError> {
        let json = match fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let file: SessionFile = serde_json::from_str(&json).map_err(|e| {
            UndoError::SessionError(format!("Failed to parse session {}: {}", self.id, e))
        })?;
        self.operations = file.operations;

        debug!(session = %self.id, operations = self.operations.len(), "Loaded session");
        Ok(())
    }

    /// Write the session file
    pub async fn save(&self) -> Result<(), UndoError> {
        let file = SessionFile {
            session_id: self.id.clone(),
            operations: self.operations.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, json).await.map_err(|e| {
            UndoError::StorageError(format!("Failed to write session {}: {}", self.id, e))
        })?;
        Ok(())
    }

    /// Append a record and save
    pub async fn add_operation(&mut self, record: OperationRecord) -> Result<(), UndoError> {
        self.operations.push(record);
        self.save().await
    }

    /// Records in tracking order, optionally including undone ones
    pub fn operations(&self, include_undone: bool) -> Vec<OperationRecord> {
        self.operations
            .iter()
            .filter(|r| include_undone || !r.is_undone())
            .cloned()
            .collect()
    }

    /// Records not undone, newest first
    pub fn active(&self) -> Vec<OperationRecord> {
        let mut active = self.operations(false);
        active.reverse();
        active
    }

    /// Undone records, oldest first. With cascades undone newest-first this
    /// is also most-recently-undone first.
    pub fn undone(&self) -> Vec<OperationRecord> {
        self.operations
            .iter()
            .filter(|r| r.is_undone())
            .cloned()
            .collect()
    }

    /// Record with the given id
    pub fn get(&self, id: &str) -> Option<&OperationRecord> {
        self.operations.iter().find(|r| r.id() == id)
    }

    /// Flag a record undone. Returns `false` if the id is unknown.
    pub async fn mark_undone(&mut self, id: &str) -> Result<bool, UndoError> {
        self.set_undone(id, true).await
    }

    /// Clear a record's undone flag. Returns `false` if the id is unknown.
    pub async fn mark_redone(&mut self, id: &str) -> Result<bool, UndoError> {
        self.set_undone(id, false).await
    }

    async fn set_undone(&mut self, id: &str, undone: bool) -> Result<bool, UndoError> {
        let Some(record) = self.operations.iter_mut().find(|r| r.id() == id) else {
            return Ok(false);
        };
        if record.is_undone() != undone {
            record.set_undone(undone);
            self.save().await?;
        }
        Ok(true)
    }

    /// Ids of every session file
    pub async fn list_sessions(config: &UndoConfig) -> Result<Vec<String>, UndoError> {
        let mut entries = match fs::read_dir(&config.sessions_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem() {
                    ids.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Id named by the current-session pointer file, if any
    pub async fn current_session(config: &UndoConfig) -> Option<String> {
        let id = fs::read_to_string(&config.current_session_path).await.ok()?;
        let id = id.trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    /// Point the current-session file at `session_id`
    pub async fn set_current_session(config: &UndoConfig, session_id: &str) -> Result<(), UndoError> {
        if let Some(parent) = config.current_session_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&config.current_session_path, session_id).await?;
        info!(session = session_id, "Switched current session");
        Ok(())
    }

    /// Record a tool call seen by the hook, before the tool runs. Content
    /// that the tool is about to destroy is read from disk now.
    pub async fn track_tool_call(
        &mut self,
        input: &HookInput,
    ) -> Result<Option<OperationRecord>, UndoError> {
        let params: HookParameters = serde_json::from_value(input.parameters.clone())
            .unwrap_or_default();

        let Some(payload) = capture_payload(&input.tool, params).await else {
            return Ok(None);
        };
        let record = OperationRecord::new(Uuid::new_v4().to_string(), Utc::now(), payload);
        self.add_operation(record.clone()).await?;

        debug!(session = %self.id, operation = %record.summary(), "Tracked tool call");
        Ok(Some(record))
    }
}

async fn capture_payload(tool: &str, params: HookParameters) -> Option<OperationPayload> {
    match tool {
        "Write" => Some(OperationPayload::FileCreate(FileCreateData {
            file_path: params.file_path?.into(),
            content: params.content,
        })),
        "Edit" => {
            let file_path = params.file_path?;
            let mut data = FileEditData::single(
                file_path,
                params.old_string,
                params.new_string,
                params.replace_all,
            );
            data.original_content = fs::read_to_string(&data.file_path).await.ok();
            Some(OperationPayload::FileEdit(data))
        }
        "MultiEdit" => {
            let mut data = FileEditData::multi(params.file_path?, params.edits);
            data.original_content = fs::read_to_string(&data.file_path).await.ok();
            Some(OperationPayload::FileEdit(data))
        }
        "Bash" => {
            let command = params.command?;
            Some(match shell::classify_tracked(&command) {
                ShellAction::DeleteFile(file_path) => {
                    let content = fs::read_to_string(&file_path).await.ok();
                    OperationPayload::FileDelete(FileDeleteData { file_path, content })
                }
                ShellAction::DeleteDirectory(dir_path) => {
                    OperationPayload::DirectoryDelete(DirectoryData { dir_path })
                }
                ShellAction::Rename { from, to } => OperationPayload::FileRename(FileRenameData {
                    old_path: from,
                    new_path: to,
                }),
                ShellAction::CreateDirectory(dir_path) => {
                    OperationPayload::DirectoryCreate(DirectoryData { dir_path })
                }
                ShellAction::Opaque => OperationPayload::ShellCommand(ShellCommandData { command }),
            })
        }
        _ => None,
    }
}
