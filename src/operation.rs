//! Operation records - one reversible action each

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of reversible action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FileCreate,
    FileEdit,
    FileDelete,
    FileRename,
    DirectoryCreate,
    DirectoryDelete,
    #[serde(rename = "bash_command")]
    ShellCommand,
}

impl OperationKind {
    /// Every kind, in declaration order
    pub const ALL: [OperationKind; 7] = [
        Self::FileCreate,
        Self::FileEdit,
        Self::FileDelete,
        Self::FileRename,
        Self::DirectoryCreate,
        Self::DirectoryDelete,
        Self::ShellCommand,
    ];

    /// Stable tag used in persisted records
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileCreate => "file_create",
            Self::FileEdit => "file_edit",
            Self::FileDelete => "file_delete",
            Self::FileRename => "file_rename",
            Self::DirectoryCreate => "directory_create",
            Self::DirectoryDelete => "directory_delete",
            Self::ShellCommand => "bash_command",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a file creation (a `Write` call)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCreateData {
    pub file_path: PathBuf,
    /// Content the file was created with, if the log carried it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One `(old, new)` pair of a multi-edit, as the tool wrote it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditPair {
    #[serde(default)]
    pub old_string: String,
    #[serde(default)]
    pub new_string: String,
    #[serde(default)]
    pub replace_all: bool,
}

/// Payload of a file edit (`Edit` or `MultiEdit`, or a hook-captured edit)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEditData {
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_string: Option<String>,
    #[serde(default)]
    pub replace_all: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edits: Vec<EditPair>,
    #[serde(default)]
    pub is_multi_edit: bool,
    /// Full file content before the edit (local tracking only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_content: Option<String>,
}

/// How an edit can be reversed, in priority order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EditMode<'a> {
    /// Whole-file snapshot of the content before the edit
    Legacy { original: &'a str },
    /// Ordered sub-edits of a multi-edit
    Multi(&'a [EditPair]),
    /// A single recorded substitution
    Single {
        old: &'a str,
        new: &'a str,
        replace_all: bool,
    },
    /// Not enough recorded data to reverse anything
    Insufficient,
}

impl FileEditData {
    /// A single substitution as recorded by an `Edit` call
    pub fn single(
        file_path: impl Into<PathBuf>,
        old_string: impl Into<String>,
        new_string: impl Into<String>,
        replace_all: bool,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            old_string: Some(old_string.into()),
            new_string: Some(new_string.into()),
            replace_all,
            edits: Vec::new(),
            is_multi_edit: false,
            original_content: None,
            new_content: None,
        }
    }

    /// An ordered list of substitutions as recorded by a `MultiEdit` call
    pub fn multi(file_path: impl Into<PathBuf>, edits: Vec<EditPair>) -> Self {
        Self {
            file_path: file_path.into(),
            old_string: None,
            new_string: None,
            replace_all: false,
            edits,
            is_multi_edit: true,
            original_content: None,
            new_content: None,
        }
    }

    /// Reversal strategy for undo
    pub fn mode(&self) -> EditMode<'_> {
        if let Some(original) = &self.original_content {
            return EditMode::Legacy { original };
        }
        if self.is_multi_edit {
            return EditMode::Multi(&self.edits);
        }
        match (&self.old_string, &self.new_string) {
            (Some(old), Some(new)) => EditMode::Single {
                old,
                new,
                replace_all: self.replace_all,
            },
            _ => EditMode::Insufficient,
        }
    }
}

/// Payload of a file deletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDeleteData {
    pub file_path: PathBuf,
    /// Content at deletion time; absent when it could not be recovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Payload of a rename
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRenameData {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
}

/// Payload of a directory creation or deletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryData {
    pub dir_path: PathBuf,
}

/// Payload of an opaque shell command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellCommandData {
    pub command: String,
}

/// Kind-specific payload. The variant fixes the record's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    FileCreate(FileCreateData),
    FileEdit(FileEditData),
    FileDelete(FileDeleteData),
    FileRename(FileRenameData),
    DirectoryCreate(DirectoryData),
    DirectoryDelete(DirectoryData),
    ShellCommand(ShellCommandData),
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::FileCreate(_) => OperationKind::FileCreate,
            Self::FileEdit(_) => OperationKind::FileEdit,
            Self::FileDelete(_) => OperationKind::FileDelete,
            Self::FileRename(_) => OperationKind::FileRename,
            Self::DirectoryCreate(_) => OperationKind::DirectoryCreate,
            Self::DirectoryDelete(_) => OperationKind::DirectoryDelete,
            Self::ShellCommand(_) => OperationKind::ShellCommand,
        }
    }

    /// The path this operation acts on (the destination for renames)
    pub fn target_path(&self) -> Option<&Path> {
        match self {
            Self::FileCreate(d) => Some(&d.file_path),
            Self::FileEdit(d) => Some(&d.file_path),
            Self::FileDelete(d) => Some(&d.file_path),
            Self::FileRename(d) => Some(&d.new_path),
            Self::DirectoryCreate(d) | Self::DirectoryDelete(d) => Some(&d.dir_path),
            Self::ShellCommand(_) => None,
        }
    }

    fn to_data(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::FileCreate(d) => serde_json::to_value(d),
            Self::FileEdit(d) => serde_json::to_value(d),
            Self::FileDelete(d) => serde_json::to_value(d),
            Self::FileRename(d) => serde_json::to_value(d),
            Self::DirectoryCreate(d) | Self::DirectoryDelete(d) => serde_json::to_value(d),
            Self::ShellCommand(d) => serde_json::to_value(d),
        }
    }

    fn from_data(kind: OperationKind, data: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            OperationKind::FileCreate => Self::FileCreate(serde_json::from_value(data)?),
            OperationKind::FileEdit => Self::FileEdit(serde_json::from_value(data)?),
            OperationKind::FileDelete => Self::FileDelete(serde_json::from_value(data)?),
            OperationKind::FileRename => Self::FileRename(serde_json::from_value(data)?),
            OperationKind::DirectoryCreate => Self::DirectoryCreate(serde_json::from_value(data)?),
            OperationKind::DirectoryDelete => Self::DirectoryDelete(serde_json::from_value(data)?),
            OperationKind::ShellCommand => Self::ShellCommand(serde_json::from_value(data)?),
        })
    }
}

/// A single reversible action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordRepr", into = "RecordRepr")]
pub struct OperationRecord {
    id: String,
    timestamp: DateTime<Utc>,
    payload: OperationPayload,
    undone: bool,
}

impl OperationRecord {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>, payload: OperationPayload) -> Self {
        Self {
            id: id.into(),
            timestamp,
            payload,
            undone: false,
        }
    }

    /// Identifier, unique within the originating log
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &OperationPayload {
        &self.payload
    }

    /// Whether this record currently sits in the undone view
    pub fn is_undone(&self) -> bool {
        self.undone
    }

    pub fn with_undone(mut self, undone: bool) -> Self {
        self.undone = undone;
        self
    }

    pub(crate) fn set_undone(&mut self, undone: bool) {
        self.undone = undone;
    }

    /// One-line description
    pub fn summary(&self) -> String {
        match &self.payload {
            OperationPayload::FileRename(d) => format!(
                "{} {} -> {}",
                self.kind(),
                d.old_path.display(),
                d.new_path.display()
            ),
            OperationPayload::ShellCommand(d) => format!("{} {}", self.kind(), d.command),
            other => match other.target_path() {
                Some(path) => format!("{} {}", self.kind(), path.display()),
                None => self.kind().to_string(),
            },
        }
    }
}

/// Persisted shape: `{id, timestamp, type, data, undone}`
#[derive(Serialize, Deserialize)]
struct RecordRepr {
    id: String,
    timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    kind: OperationKind,
    data: serde_json::Value,
    #[serde(default)]
    undone: bool,
}

impl TryFrom<RecordRepr> for OperationRecord {
    type Error = serde_json::Error;

    fn try_from(repr: RecordRepr) -> Result<Self, Self::Error> {
        Ok(Self {
            id: repr.id,
            timestamp: repr.timestamp,
            payload: OperationPayload::from_data(repr.kind, repr.data)?,
            undone: repr.undone,
        })
    }
}

impl From<OperationRecord> for RecordRepr {
    fn from(record: OperationRecord) -> Self {
        // payload structs only have string keys, so this cannot fail
        let data = record.payload.to_data().unwrap_or_default();
        Self {
            id: record.id,
            timestamp: record.timestamp,
            kind: record.payload.kind(),
            data,
            undone: record.undone,
        }
    }
}
