/*!
Journal record schema: the data model for one run's transaction log.

Each record is serialized as a single JSON line. The first line of every
journal is a [`JournalHeader`] identifying the run; every subsequent line is
a [`JournalEntry`] describing one recorded file-system mutation.
*/

use crate::{Result, RewindError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Current journal format version for compatibility tracking
pub const JOURNAL_FORMAT_VERSION: u8 = 1;

/// Kind of file-system mutation a journal entry describes
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// A file that did not exist before the run was created
    Create,
    /// An existing file was overwritten; a pre-image backup was captured first
    Modify,
}

/// Opaque identifier of a backup record in the run's backup area.
///
/// Ids are allocated from a per-store counter and never reused within a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BackupId(pub u64);

impl BackupId {
    /// File name of this backup inside the backup area
    pub fn file_name(&self) -> String {
        format!("{:08}.bak", self.0)
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

/// One recorded file-system mutation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Strictly increasing sequence number, total-ordered across all callers
    pub sequence: u64,

    /// Kind of mutation
    pub kind: OpKind,

    /// Canonical absolute path of the mutated file
    pub target_path: PathBuf,

    /// Backup holding the full pre-image (Modify entries only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_ref: Option<BackupId>,

    /// SHA-256 hex digest of the captured pre-image (Modify entries only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// When the entry was recorded
    pub timestamp: DateTime<Utc>,
}

impl JournalEntry {
    /// Create a Create entry
    pub fn create(sequence: u64, target_path: PathBuf) -> Self {
        Self {
            sequence,
            kind: OpKind::Create,
            target_path,
            backup_ref: None,
            content_hash: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a Modify entry referencing a captured backup
    pub fn modify(
        sequence: u64,
        target_path: PathBuf,
        backup_ref: BackupId,
        content_hash: String,
    ) -> Self {
        Self {
            sequence,
            kind: OpKind::Modify,
            target_path,
            backup_ref: Some(backup_ref),
            content_hash: Some(content_hash),
            timestamp: Utc::now(),
        }
    }

    /// Verify backup bytes against the recorded pre-image hash
    ///
    /// Entries without a recorded hash (Create entries) always pass.
    pub fn verify_integrity(&self, data: &[u8]) -> Result<()> {
        let Some(expected) = &self.content_hash else {
            return Ok(());
        };
        let actual = compute_hash(data);
        if &actual == expected {
            Ok(())
        } else {
            Err(RewindError::IntegrityCheckFailed {
                expected: expected.clone(),
                actual,
            })
        }
    }
}

/// Run identification written as the first record of every journal
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct JournalHeader {
    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// Unique identifier for the run this journal belongs to
    pub run_id: Uuid,

    /// Canonical root of the processed directory tree
    pub root: PathBuf,

    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl JournalHeader {
    /// Create a header for a new run over `root`
    pub fn new(root: PathBuf) -> Self {
        Self {
            format_version: JOURNAL_FORMAT_VERSION,
            run_id: Uuid::new_v4(),
            root,
            started_at: Utc::now(),
        }
    }

    /// Check whether a persisted header can be read by this build
    pub fn is_compatible(&self) -> bool {
        self.format_version <= JOURNAL_FORMAT_VERSION
    }
}

/// One line of the journal file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum JournalRecord {
    /// First line: run identification
    Header(JournalHeader),
    /// Every other line: one recorded mutation
    Entry(JournalEntry),
}

/// Compute the SHA-256 hex digest of the provided data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash() {
        // SHA-256 of "test data" should be consistent
        assert_eq!(
            compute_hash(b"test data"),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_backup_id_file_name() {
        assert_eq!(BackupId(0).file_name(), "00000000.bak");
        assert_eq!(BackupId(42).file_name(), "00000042.bak");
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = JournalEntry::modify(
            3,
            PathBuf::from("/library/gamelist.xml"),
            BackupId(3),
            compute_hash(b"<games/>"),
        );

        let line = serde_json::to_string(&JournalRecord::Entry(entry.clone())).unwrap();
        let parsed: JournalRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, JournalRecord::Entry(entry));
    }

    #[test]
    fn test_create_entry_omits_backup_fields() {
        let entry = JournalEntry::create(1, PathBuf::from("/library/images/poster.png"));
        let line = serde_json::to_string(&entry).unwrap();
        assert!(!line.contains("backup_ref"));
        assert!(!line.contains("content_hash"));
    }

    #[test]
    fn test_header_compatibility() {
        let header = JournalHeader::new(PathBuf::from("/library"));
        assert!(header.is_compatible());
        assert_eq!(header.format_version, JOURNAL_FORMAT_VERSION);

        let future = JournalHeader {
            format_version: JOURNAL_FORMAT_VERSION + 1,
            ..header
        };
        assert!(!future.is_compatible());
    }

    #[test]
    fn test_verify_integrity() {
        let entry = JournalEntry::modify(
            1,
            PathBuf::from("/library/gamelist.xml"),
            BackupId(1),
            compute_hash(b"<games/>"),
        );

        assert!(entry.verify_integrity(b"<games/>").is_ok());

        let err = entry.verify_integrity(b"<games><game/></games>").unwrap_err();
        assert!(matches!(err, RewindError::IntegrityCheckFailed { .. }));
    }
}
