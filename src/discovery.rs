//! Locating agent activity logs on disk
//!
//! The agent keeps one directory per working directory under its projects
//! root, named by a lossy encoding of the path, with one `*.jsonl` log per
//! session inside.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tracing::debug;

use crate::error::UndoError;

/// One log found under the projects root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLog {
    /// File stem of the log
    pub id: String,
    /// Best-effort decoding of the project directory name
    pub project: String,
    /// Project directory name as found on disk
    pub raw_project_dir: String,
    pub file: PathBuf,
}

/// Finds logs under the agent's projects root
#[derive(Debug, Clone)]
pub struct SessionLocator {
    projects_dir: PathBuf,
}

impl SessionLocator {
    pub fn new(projects_dir: PathBuf) -> Self {
        Self { projects_dir }
    }

    pub fn projects_dir(&self) -> &Path {
        &self.projects_dir
    }

    /// Directory holding the logs for `cwd`
    pub fn project_dir_for(&self, cwd: &Path) -> PathBuf {
        self.projects_dir
            .join(encode_project_path(&cwd.to_string_lossy(), cfg!(windows)))
    }

    /// Most recently modified log for `cwd`
    pub async fn current_log(&self, cwd: &Path) -> Result<Option<PathBuf>, UndoError> {
        let dir = self.project_dir_for(cwd);
        let logs = match jsonl_files(&dir).await {
            Ok(logs) => logs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(dir = %dir.display(), "No project directory for working directory");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for log in logs {
            let modified = fs::metadata(&log).await?.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, log));
            }
        }
        Ok(newest.map(|(_, log)| log))
    }

    /// Every log of every project, sorted by project then session id
    pub async fn all_logs(&self) -> Result<Vec<SessionLog>, UndoError> {
        let mut projects = match fs::read_dir(&self.projects_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = projects.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let raw_project_dir = entry.file_name().to_string_lossy().into_owned();
            let project = decode_project_dir(&raw_project_dir, cfg!(windows));

            for file in jsonl_files(&entry.path()).await? {
                let Some(id) = file.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                    continue;
                };
                sessions.push(SessionLog {
                    id,
                    project: project.clone(),
                    raw_project_dir: raw_project_dir.clone(),
                    file,
                });
            }
        }

        sessions.sort_by(|a, b| (&a.raw_project_dir, &a.id).cmp(&(&b.raw_project_dir, &b.id)));
        debug!(count = sessions.len(), "Enumerated session logs");
        Ok(sessions)
    }
}

async fn jsonl_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "jsonl") {
            files.push(path);
        }
    }
    Ok(files)
}

fn encode_project_path(cwd: &str, windows: bool) -> String {
    let cwd = if windows {
        cwd.replace(":\\", "--").replace(":/", "--")
    } else {
        cwd.to_string()
    };
    cwd.chars()
        .map(|c| {
            if c == '/' || c == '_' || c.is_whitespace() || (windows && c == '\\') {
                '-'
            } else {
                c
            }
        })
        .collect()
}

fn decode_project_dir(raw: &str, windows: bool) -> String {
    if windows {
        raw.replace("--", ":\\").replace('-', "\\")
    } else {
        raw.replace('-', "/")
    }
}
