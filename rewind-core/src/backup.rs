/*!
Backup store: full pre-image copies of files about to be modified.

This module defines the storage abstraction (port) and the directory-backed
adapter used in production, following the same port/adapter seam as the rest
of the engine. The recorder stores pre-images here before a collaborator is
allowed to overwrite the file; the undo engine fetches them back.
*/

use crate::entry::BackupId;
use crate::{Result, RewindError};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Storage abstraction for pre-image backups
///
/// Ids are allocated by the store, are unique within a run, and are never
/// reused. A stored backup must be durable before `store` returns: the
/// recorder relies on this to guarantee the pre-image survives a crash that
/// happens right after the caller's mutating write.
pub trait BackupStore {
    /// Store a full pre-image and return its id
    fn store(&self, data: &[u8]) -> Result<BackupId>;

    /// Fetch the bytes of a previously stored backup
    fn fetch(&self, id: BackupId) -> Result<Vec<u8>>;

    /// Check whether a backup exists
    fn contains(&self, id: BackupId) -> bool;

    /// Delete the entire backup area
    ///
    /// Invoked only after the undo engine reports full success; the journal
    /// and the backup area are a single disposal unit.
    fn dispose(&self) -> Result<()>;
}

/// Directory-backed backup store
///
/// Each backup is written to `<dir>/<id>.bak` and fsynced before the id is
/// handed out. The directory is created lazily on the first `store`, so a
/// run that modifies nothing leaves no backup area behind.
#[derive(Debug)]
pub struct DirBackupStore {
    dir: PathBuf,
    next_id: AtomicU64,
}

impl DirBackupStore {
    /// Create a store over the given backup area
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Path of the backup file for `id`
    fn backup_path(&self, id: BackupId) -> PathBuf {
        self.dir.join(id.file_name())
    }
}

impl BackupStore for DirBackupStore {
    fn store(&self, data: &[u8]) -> Result<BackupId> {
        let id = BackupId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let path = self.backup_path(id);

        fs::create_dir_all(&self.dir).map_err(|e| {
            RewindError::backup(format!(
                "Failed to create backup area {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut file = File::create(&path).map_err(|e| {
            RewindError::backup(format!("Failed to create backup {}: {}", path.display(), e))
        })?;
        file.write_all(data).map_err(|e| {
            RewindError::backup(format!("Failed to write backup {}: {}", path.display(), e))
        })?;
        // The pre-image must survive a crash that happens after the caller's
        // mutating write, so flush it to disk before handing out the id.
        file.sync_all().map_err(|e| {
            RewindError::backup(format!("Failed to sync backup {}: {}", path.display(), e))
        })?;

        debug!(backup = %id, bytes = data.len(), "captured pre-image");
        Ok(id)
    }

    fn fetch(&self, id: BackupId) -> Result<Vec<u8>> {
        let path = self.backup_path(id);
        fs::read(&path).map_err(|e| {
            RewindError::backup(format!("Failed to read backup {}: {}", path.display(), e))
        })
    }

    fn contains(&self, id: BackupId) -> bool {
        self.backup_path(id).is_file()
    }

    fn dispose(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| {
                RewindError::backup(format!(
                    "Failed to dispose backup area {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

/// Memory-backed backup store for unit tests
#[cfg(test)]
pub struct MemoryBackupStore {
    data: std::sync::Mutex<std::collections::HashMap<BackupId, Vec<u8>>>,
    next_id: AtomicU64,
}

#[cfg(test)]
impl MemoryBackupStore {
    pub fn new() -> Self {
        Self {
            data: std::sync::Mutex::new(std::collections::HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

#[cfg(test)]
impl BackupStore for MemoryBackupStore {
    fn store(&self, data: &[u8]) -> Result<BackupId> {
        let id = BackupId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.data.lock().unwrap().insert(id, data.to_vec());
        Ok(id)
    }

    fn fetch(&self, id: BackupId) -> Result<Vec<u8>> {
        self.data
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RewindError::backup(format!("Backup not found: {id}")))
    }

    fn contains(&self, id: BackupId) -> bool {
        self.data.lock().unwrap().contains_key(&id)
    }

    fn dispose(&self) -> Result<()> {
        self.data.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirBackupStore::new(temp_dir.path().join("backups"));

        let id = store.store(b"original bytes").unwrap();
        assert!(store.contains(id));
        assert_eq!(store.fetch(id).unwrap(), b"original bytes");
    }

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirBackupStore::new(temp_dir.path().join("backups"));

        let a = store.store(b"a").unwrap();
        let b = store.store(b"b").unwrap();
        assert!(b > a);
        assert_eq!(store.fetch(a).unwrap(), b"a");
        assert_eq!(store.fetch(b).unwrap(), b"b");
    }

    #[test]
    fn test_fetch_missing_backup() {
        let temp_dir = TempDir::new().unwrap();
        let store = DirBackupStore::new(temp_dir.path().join("backups"));

        let result = store.fetch(BackupId(99));
        assert!(matches!(result, Err(RewindError::Backup(_))));
    }

    #[test]
    fn test_dispose_removes_area() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("backups");
        let store = DirBackupStore::new(&dir);

        store.store(b"x").unwrap();
        assert!(dir.exists());

        store.dispose().unwrap();
        assert!(!dir.exists());

        // Disposing an already-missing area is fine
        store.dispose().unwrap();
    }

    #[test]
    fn test_no_area_created_until_first_store() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("backups");
        let _store = DirBackupStore::new(&dir);
        assert!(!dir.exists());
    }
}
