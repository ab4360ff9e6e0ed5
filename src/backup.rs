//! Backup storage for pre-mutation file content

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs;
use tracing::debug;

use crate::error::UndoError;

/// Why a snapshot was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupPurpose {
    /// Content of a created file, taken before undo deletes it
    Deleted,
    /// Content of an edited file, taken before undo rewrites it
    Current,
    /// Content of an edited file, taken before redo rewrites it
    Redo,
    /// Content of a file, taken before redo deletes it again
    RedoDeleted,
}

impl BackupPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Current => "current",
            Self::Redo => "redo",
            Self::RedoDeleted => "redo-deleted",
        }
    }
}

/// Backup key: `(operation id, purpose)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupKey {
    pub operation_id: String,
    pub purpose: BackupPurpose,
}

impl BackupKey {
    pub fn new(operation_id: impl Into<String>, purpose: BackupPurpose) -> Self {
        Self {
            operation_id: operation_id.into(),
            purpose,
        }
    }

    /// File name safe on every platform
    pub fn file_name(&self) -> String {
        let id: String = self
            .operation_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}-{}", id, self.purpose.as_str())
    }
}

impl fmt::Display for BackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.operation_id, self.purpose.as_str())
    }
}

/// Where a snapshot ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRef {
    pub key: BackupKey,
    /// On-disk location, for stores that have one
    pub location: Option<PathBuf>,
}

impl fmt::Display for BackupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(path) => write!(f, "{}", path.display()),
            None => write!(f, "{}", self.key),
        }
    }
}

/// Keyed byte-blob store used by the engines
#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any earlier snapshot
    async fn put(&self, key: &BackupKey, bytes: &[u8]) -> Result<BackupRef, UndoError>;

    /// Fetch the snapshot under `key`, if one exists
    async fn get(&self, key: &BackupKey) -> Result<Option<Vec<u8>>, UndoError>;
}

/// One file per key under a backup root
pub struct FsBackupStore {
    base_dir: PathBuf,
}

impl FsBackupStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Create the backup root
    pub async fn init(&self) -> Result<(), UndoError> {
        fs::create_dir_all(&self.base_dir).await.map_err(|e| {
            UndoError::StorageError(format!("Failed to create backup directory: {}", e))
        })?;

        debug!(dir = %self.base_dir.display(), "Initialized backup storage");
        Ok(())
    }

    pub fn path_for(&self, key: &BackupKey) -> PathBuf {
        self.base_dir.join(key.file_name())
    }
}

#[async_trait]
impl BackupStore for FsBackupStore {
    async fn put(&self, key: &BackupKey, bytes: &[u8]) -> Result<BackupRef, UndoError> {
        let path = self.path_for(key);
        fs::write(&path, bytes).await.map_err(|e| {
            UndoError::StorageError(format!("Failed to write backup {}: {}", key, e))
        })?;

        debug!(key = %key, path = %path.display(), size = bytes.len(), "Saved backup");
        Ok(BackupRef {
            key: key.clone(),
            location: Some(path),
        })
    }

    async fn get(&self, key: &BackupKey) -> Result<Option<Vec<u8>>, UndoError> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(UndoError::StorageError(format!(
                "Failed to read backup {}: {}",
                key, e
            ))),
        }
    }
}

/// In-process store for dry runs and tests
#[derive(Default)]
pub struct MemoryBackupStore {
    blobs: RwLock<HashMap<BackupKey, Vec<u8>>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl BackupStore for MemoryBackupStore {
    async fn put(&self, key: &BackupKey, bytes: &[u8]) -> Result<BackupRef, UndoError> {
        self.blobs.write().insert(key.clone(), bytes.to_vec());
        Ok(BackupRef {
            key: key.clone(),
            location: None,
        })
    }

    async fn get(&self, key: &BackupKey) -> Result<Option<Vec<u8>>, UndoError> {
        Ok(self.blobs.read().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_file_name() {
        let key = BackupKey::new("toolu_01AB", BackupPurpose::RedoDeleted);
        assert_eq!(key.file_name(), "toolu_01AB-redo-deleted");

        let key = BackupKey::new("../etc/passwd", BackupPurpose::Deleted);
        assert_eq!(key.file_name(), ".._etc_passwd-deleted");
    }

    #[tokio::test]
    async fn test_fs_store_put_get() {
        let dir = tempdir().unwrap();
        let store = FsBackupStore::new(dir.path().join("backups"));
        store.init().await.unwrap();

        let key = BackupKey::new("t1", BackupPurpose::Current);
        let backup = store.put(&key, b"snapshot").await.unwrap();

        assert_eq!(backup.location, Some(dir.path().join("backups").join("t1-current")));
        assert_eq!(store.get(&key).await.unwrap(), Some(b"snapshot".to_vec()));
    }

    #[tokio::test]
    async fn test_fs_store_absent_key() {
        let dir = tempdir().unwrap();
        let store = FsBackupStore::new(dir.path().to_path_buf());

        let key = BackupKey::new("t1", BackupPurpose::Deleted);
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purposes_do_not_collide() {
        let store = MemoryBackupStore::new();
        store
            .put(&BackupKey::new("t1", BackupPurpose::Current), b"a")
            .await
            .unwrap();
        store
            .put(&BackupKey::new("t1", BackupPurpose::Redo), b"b")
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(
            store
                .get(&BackupKey::new("t1", BackupPurpose::Current))
                .await
                .unwrap(),
            Some(b"a".to_vec())
        );
    }
}
