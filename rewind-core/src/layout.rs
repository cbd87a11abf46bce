/*!
Well-known on-disk locations for one run's journal and backup area.

Both live under a `.rewind` scratch directory at the root of the processed
tree so they can be disposed of as a single unit after a fully successful
undo.
*/

use crate::{Result, RewindError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-root scratch directory holding journal and backups
pub const SCRATCH_DIR_NAME: &str = ".rewind";

/// Journal file name inside the scratch directory
pub const JOURNAL_FILE_NAME: &str = "journal.jsonl";

/// Backup area name inside the scratch directory
pub const BACKUP_DIR_NAME: &str = "backups";

/// Resolved locations for one processed root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    /// Resolve the layout for a processed root directory
    ///
    /// The root must exist and be a directory; it is canonicalized so every
    /// journaled path is anchored to a stable absolute location.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(RewindError::validation(format!(
                "Processed root is not a directory: {}",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    /// Canonical root of the processed tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory holding journal and backup area
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(SCRATCH_DIR_NAME)
    }

    /// Path of the run's journal file
    pub fn journal_path(&self) -> PathBuf {
        self.scratch_dir().join(JOURNAL_FILE_NAME)
    }

    /// Path of the run's backup area
    pub fn backup_dir(&self) -> PathBuf {
        self.scratch_dir().join(BACKUP_DIR_NAME)
    }

    /// Remove the scratch directory if it is empty
    ///
    /// Called after journal and backups are gone; a non-empty or already
    /// missing directory is left alone.
    pub fn remove_scratch_if_empty(&self) {
        let _ = std::fs::remove_dir(self.scratch_dir());
    }
}
