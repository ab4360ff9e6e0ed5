//! Storage locations

use std::path::{Path, PathBuf};

/// Where undo state, backups and sessions live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoConfig {
    /// Directory for pre-mutation snapshots
    pub backup_dir: PathBuf,
    /// JSON file holding undone ids per log
    pub undo_state_path: PathBuf,
    /// Directory for locally tracked sessions
    pub sessions_dir: PathBuf,
    /// File naming the current local session
    pub current_session_path: PathBuf,
    /// Root of the agent's per-project log directories
    pub projects_dir: PathBuf,
}

impl UndoConfig {
    /// Everything under `root`, including the projects directory
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            backup_dir: root.join("backups"),
            undo_state_path: root.join("undone-operations.json"),
            sessions_dir: root.join("sessions"),
            current_session_path: root.join("current-session"),
            projects_dir: root.join("projects"),
        }
    }

    /// Same as `self`, reading agent logs from `projects_dir`
    pub fn projects_dir(mut self, projects_dir: impl Into<PathBuf>) -> Self {
        self.projects_dir = projects_dir.into();
        self
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_root(home.join(".burrow")).projects_dir(home.join(".claude").join("projects"))
    }
}
