//! Activity log extraction
//!
//! Streams a newline-delimited JSON log and turns every assistant tool call
//! that maps to a known action into one [`OperationRecord`]. The log is only
//! ever read; each call re-parses it from the start.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::UndoError;
use crate::operation::{
    DirectoryData, EditPair, FileCreateData, FileDeleteData, FileEditData, FileRenameData,
    OperationPayload, OperationRecord, ShellCommandData,
};
use crate::shell::{self, ShellAction};
use crate::undo_state::UndoStateTracker;

/// A `tool_use` item inside an assistant message
#[derive(Debug, Clone, Deserialize)]
pub struct ToolUse {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Deserialize)]
struct WriteInput {
    file_path: Option<String>,
    content: Option<String>,
}

#[derive(Deserialize)]
struct EditInput {
    file_path: Option<String>,
    #[serde(default)]
    old_string: String,
    #[serde(default)]
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Deserialize)]
struct MultiEditInput {
    file_path: Option<String>,
    #[serde(default)]
    edits: Vec<EditPair>,
}

#[derive(Deserialize)]
struct BashInput {
    command: Option<String>,
}

/// Reads activity logs and produces the active and undone views
#[derive(Debug, Clone)]
pub struct LogExtractor {
    tracker: UndoStateTracker,
}

impl LogExtractor {
    pub fn new(tracker: UndoStateTracker) -> Self {
        Self { tracker }
    }

    /// Every record in the log, in log (append) order
    pub async fn extract(&self, log: &Path) -> Result<Vec<OperationRecord>, UndoError> {
        let file = File::open(log).await.map_err(|source| UndoError::LogUnreadable {
            path: log.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);

        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut buf = Vec::new();
        let mut line_no = 0usize;
        let mut skipped = 0usize;

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await.map_err(|source| {
                UndoError::LogUnreadable {
                    path: log.to_path_buf(),
                    source,
                }
            })?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let Ok(line) = std::str::from_utf8(&buf) else {
                skipped += 1;
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            let entry: Value = match serde_json::from_str(line) {
                Ok(v) => v,
                Err(e) => {
                    debug!(line = line_no, error = %e, "Skipping malformed log line");
                    skipped += 1;
                    continue;
                }
            };

            for record in records_from_entry(&entry) {
                if !seen.insert(record.id().to_string()) {
                    warn!(id = record.id(), line = line_no, "Duplicate tool call id, keeping first");
                    continue;
                }
                records.push(record);
            }
        }

        debug!(
            log = %log.display(),
            records = records.len(),
            skipped = skipped,
            "Extracted operations from log"
        );

        Ok(records)
    }

    /// Records not yet undone, newest first
    pub async fn active(&self, log: &Path) -> Result<Vec<OperationRecord>, UndoError> {
        let records = self.extract(log).await?;
        let mut active = self.tracker.filter_active(records, log).await?;
        active.reverse();
        Ok(active)
    }

    /// Undone records, most recently undone first
    pub async fn undone(&self, log: &Path) -> Result<Vec<OperationRecord>, UndoError> {
        let records = self.extract(log).await?;
        self.tracker.undone_view(records, log).await
    }
}

/// Records carried by one log entry. Non-assistant entries yield nothing.
fn records_from_entry(entry: &Value) -> Vec<OperationRecord> {
    if entry.get("type").and_then(Value::as_str) != Some("assistant") {
        return Vec::new();
    }
    let Some(content) = entry
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let tool_uses: Vec<ToolUse> = content
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("tool_use"))
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect();
    if tool_uses.is_empty() {
        return Vec::new();
    }

    let Some(timestamp) = entry
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
    else {
        debug!("Skipping tool calls without a usable timestamp");
        return Vec::new();
    };

    tool_uses
        .iter()
        .filter_map(|tool_use| operation_from_tool_use(tool_use, timestamp))
        .collect()
}

/// Map one tool call to a record, if it names a known tool with its
/// required fields
pub fn operation_from_tool_use(
    tool_use: &ToolUse,
    timestamp: DateTime<Utc>,
) -> Option<OperationRecord> {
    let id = tool_use.id.clone()?;
    let payload = payload_for(&tool_use.name, &tool_use.input)?;
    Some(OperationRecord::new(id, timestamp, payload))
}

fn payload_for(tool: &str, input: &Value) -> Option<OperationPayload> {
    match tool {
        "Write" => {
            let input: WriteInput = serde_json::from_value(input.clone()).ok()?;
            Some(OperationPayload::FileCreate(FileCreateData {
                file_path: input.file_path?.into(),
                content: input.content,
            }))
        }
        "Edit" => {
            let input: EditInput = serde_json::from_value(input.clone()).ok()?;
            Some(OperationPayload::FileEdit(FileEditData::single(
                input.file_path?,
                input.old_string,
                input.new_string,
                input.replace_all,
            )))
        }
        "MultiEdit" => {
            let input: MultiEditInput = serde_json::from_value(input.clone()).ok()?;
            Some(OperationPayload::FileEdit(FileEditData::multi(
                input.file_path?,
                input.edits,
            )))
        }
        "Bash" => {
            let input: BashInput = serde_json::from_value(input.clone()).ok()?;
            let command = input.command?;
            Some(payload_for_command(command))
        }
        _ => None,
    }
}

fn payload_for_command(command: String) -> OperationPayload {
    match shell::classify(&command) {
        ShellAction::DeleteFile(file_path) => OperationPayload::FileDelete(FileDeleteData {
            file_path,
            content: None,
        }),
        ShellAction::Rename { from, to } => OperationPayload::FileRename(FileRenameData {
            old_path: from,
            new_path: to,
        }),
        ShellAction::CreateDirectory(dir_path) => {
            OperationPayload::DirectoryCreate(DirectoryData { dir_path })
        }
        ShellAction::DeleteDirectory(dir_path) => {
            OperationPayload::DirectoryDelete(DirectoryData { dir_path })
        }
        ShellAction::Opaque => OperationPayload::ShellCommand(ShellCommandData { command }),
    }
}
