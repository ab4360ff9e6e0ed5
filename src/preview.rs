//! Dry-run descriptions of an undo
//!
//! Nothing here mutates the filesystem. The only I/O is reading a file's
//! current content to build an excerpt.

use std::path::Path;

use serde::Serialize;
use tokio::fs;

use crate::operation::{EditMode, OperationKind, OperationPayload, OperationRecord};

const EXCERPT_LINES: usize = 5;
const CONTEXT_LINES: usize = 2;

/// What undoing a record would do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewAction {
    Delete,
    Revert,
    Restore,
    Rename,
    Remove,
    /// Nothing left to do
    None,
    /// Needs manual intervention
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub operation_id: String,
    pub kind: OperationKind,
    pub action: PreviewAction,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Describe what undoing `record` would do right now
pub async fn preview(record: &OperationRecord) -> Preview {
    let (action, summary, excerpt) = match record.payload() {
        OperationPayload::FileCreate(data) => match fs::read_to_string(&data.file_path).await {
            Ok(content) => (
                PreviewAction::Delete,
                format!("Will delete file: {}", data.file_path.display()),
                Some(head(&content)),
            ),
            Err(_) => (
                PreviewAction::None,
                format!("File does not exist: {}", data.file_path.display()),
                None,
            ),
        },
        OperationPayload::FileEdit(data) => {
            let summary = format!("Will revert file: {}", data.file_path.display());
            let excerpt = match data.mode() {
                EditMode::Legacy { original } => Some(head(original)),
                EditMode::Multi(edits) => Some(
                    edits
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| !e.new_string.is_empty())
                        .map(|(i, e)| format!("{}. {:?} -> {:?}", i + 1, e.new_string, e.old_string))
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
                EditMode::Single {
                    old,
                    new,
                    replace_all,
                } if !new.is_empty() => {
                    let mut excerpt = format!("{:?} -> {:?}", new, old);
                    if replace_all {
                        excerpt.push_str(" (all occurrences)");
                    }
                    if let Some(context) = edit_context(&data.file_path, new).await {
                        excerpt.push('\n');
                        excerpt.push_str(&context);
                    }
                    Some(excerpt)
                }
                _ => Some("Original content not available".to_string()),
            };
            (PreviewAction::Revert, summary, excerpt)
        }
        OperationPayload::FileDelete(data) => (
            PreviewAction::Restore,
            format!("Will restore file: {}", data.file_path.display()),
            Some(match &data.content {
                Some(content) => head(content),
                None => "Content not available".to_string(),
            }),
        ),
        OperationPayload::FileRename(data) => (
            PreviewAction::Rename,
            format!(
                "Will rename back: {} -> {}",
                data.new_path.display(),
                data.old_path.display()
            ),
            None,
        ),
        OperationPayload::DirectoryCreate(data) => {
            if fs::try_exists(&data.dir_path).await.unwrap_or(false) {
                (
                    PreviewAction::Remove,
                    format!("Will remove directory: {}", data.dir_path.display()),
                    None,
                )
            } else {
                (
                    PreviewAction::None,
                    format!("Directory already removed: {}", data.dir_path.display()),
                    None,
                )
            }
        }
        OperationPayload::DirectoryDelete(data) => (
            PreviewAction::Restore,
            format!("Will restore directory: {}", data.dir_path.display()),
            None,
        ),
        OperationPayload::ShellCommand(data) => (
            PreviewAction::Manual,
            format!(
                "Cannot auto-undo bash command: {}\nPlease manually revert any changes.",
                data.command
            ),
            None,
        ),
    };

    Preview {
        operation_id: record.id().to_string(),
        kind: record.kind(),
        action,
        summary,
        excerpt,
    }
}

fn head(content: &str) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut excerpt = lines[..lines.len().min(EXCERPT_LINES)].join("\n");
    if lines.len() > EXCERPT_LINES {
        excerpt.push_str("\n...");
    }
    excerpt
}

/// Lines around the first line containing `needle`, that line marked `>`
async fn edit_context(path: &Path, needle: &str) -> Option<String> {
    let content = fs::read_to_string(path).await.ok()?;
    let lines: Vec<&str> = content.split('\n').collect();
    let found = lines.iter().position(|l| l.contains(needle))?;

    let start = found.saturating_sub(CONTEXT_LINES);
    let end = (found + CONTEXT_LINES + 1).min(lines.len());
    Some(
        (start..end)
            .map(|i| {
                let marker = if i == found { "> " } else { "  " };
                format!("{}{}", marker, lines[i])
            })
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
