/*!
Durable, append-only persistence of journal records.

One JSON record per line. An append writes a single line and fsyncs it, so
it is O(1) and never rewrites earlier records; a crash mid-append can only
damage the final line, which the reader discards with a warning instead of
failing the whole read.
*/

use crate::entry::{JournalEntry, JournalHeader, JournalRecord};
use crate::{Result, RewindError};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only writer over one run's journal file
///
/// Created once at run start; the header record is durable before `create`
/// returns. Each subsequent [`append`](JournalWriter::append) is likewise
/// durable before it returns.
#[derive(Debug)]
pub struct JournalWriter {
    path: PathBuf,
    file: File,
}

impl JournalWriter {
    /// Create a fresh journal at `path` and durably write its header
    ///
    /// A new run starts a fresh log: an existing journal at the same path is
    /// truncated. Parent directories are created as needed.
    pub fn create(path: &Path, header: &JournalHeader) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RewindError::journal(format!(
                    "Failed to create journal directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|e| {
                RewindError::journal(format!("Failed to create journal {}: {}", path.display(), e))
            })?;

        let mut writer = Self {
            path: path.to_path_buf(),
            file,
        };
        writer.append_record(&JournalRecord::Header(header.clone()))?;
        Ok(writer)
    }

    /// Durably append one entry
    ///
    /// Returns only once the record is flushed to disk, so a crash
    /// immediately afterward leaves the entry visible on the next read.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<()> {
        self.append_record(&JournalRecord::Entry(entry.clone()))
    }

    fn append_record(&mut self, record: &JournalRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        self.file.write_all(line.as_bytes()).map_err(|e| {
            RewindError::journal(format!(
                "Failed to append to journal {}: {}",
                self.path.display(),
                e
            ))
        })?;
        self.file.sync_data().map_err(|e| {
            RewindError::journal(format!(
                "Failed to sync journal {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Everything a persisted journal contains
#[derive(Debug, Clone, PartialEq)]
pub struct JournalContents {
    /// Run identification; `None` when even the header was lost to a crash
    pub header: Option<JournalHeader>,
    /// Recorded entries in ascending sequence order
    pub entries: Vec<JournalEntry>,
}

/// Read a persisted journal back into memory
///
/// Entries come back in ascending sequence order. A truncated or otherwise
/// unparseable **final** line is the signature of a crash mid-append; it is
/// discarded with a warning. Damage anywhere else is corruption and fails
/// the read, as does a header written by an incompatible future version.
pub fn read_records(path: &Path) -> Result<JournalContents> {
    let raw = fs::read_to_string(path)?;
    let lines: Vec<&str> = raw.lines().collect();

    let mut header = None;
    let mut entries: Vec<JournalEntry> = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let is_last = index == lines.len() - 1;

        let record: JournalRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) if is_last => {
                warn!(
                    journal = %path.display(),
                    "discarding truncated final journal record: {e}"
                );
                break;
            }
            Err(e) => {
                return Err(RewindError::corrupt(format!(
                    "Unreadable record at line {} of {}: {}",
                    index + 1,
                    path.display(),
                    e
                )));
            }
        };

        match record {
            JournalRecord::Header(h) => {
                if index != 0 {
                    return Err(RewindError::corrupt(format!(
                        "Unexpected header at line {} of {}",
                        index + 1,
                        path.display()
                    )));
                }
                if !h.is_compatible() {
                    return Err(RewindError::corrupt(format!(
                        "Journal format version {} is newer than supported",
                        h.format_version
                    )));
                }
                header = Some(h);
            }
            JournalRecord::Entry(entry) => {
                if index == 0 {
                    return Err(RewindError::corrupt(format!(
                        "Journal {} does not start with a header",
                        path.display()
                    )));
                }
                if let Some(last) = entries.last() {
                    if entry.sequence <= last.sequence {
                        return Err(RewindError::corrupt(format!(
                            "Sequence numbers out of order at line {} of {}",
                            index + 1,
                            path.display()
                        )));
                    }
                }
                entries.push(entry);
            }
        }
    }

    Ok(JournalContents { header, entries })
}

/// Delete a persisted journal
///
/// Used only after a fully successful undo. A missing journal is fine.
pub fn delete(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| {
            RewindError::journal(format!("Failed to delete journal {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{compute_hash, BackupId, JOURNAL_FORMAT_VERSION};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn header() -> JournalHeader {
        JournalHeader::new(PathBuf::from("/library"))
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        let h = header();
        let mut writer = JournalWriter::create(&path, &h).unwrap();
        let e1 = JournalEntry::create(1, PathBuf::from("/library/images/poster.png"));
        let e2 = JournalEntry::modify(
            2,
            PathBuf::from("/library/gamelist.xml"),
            BackupId(1),
            compute_hash(b"<games/>"),
        );
        writer.append(&e1).unwrap();
        writer.append(&e2).unwrap();

        let contents = read_records(&path).unwrap();
        assert_eq!(contents.header, Some(h));
        assert_eq!(contents.entries, vec![e1, e2]);
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        let mut writer = JournalWriter::create(&path, &header()).unwrap();
        writer
            .append(&JournalEntry::create(1, PathBuf::from("/library/a.png")))
            .unwrap();
        drop(writer);

        let writer = JournalWriter::create(&path, &header()).unwrap();
        drop(writer);

        let contents = read_records(&path).unwrap();
        assert!(contents.entries.is_empty());
    }

    #[test]
    fn test_truncated_final_record_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        let mut writer = JournalWriter::create(&path, &header()).unwrap();
        let e1 = JournalEntry::create(1, PathBuf::from("/library/a.png"));
        writer.append(&e1).unwrap();
        drop(writer);

        // Simulate a crash mid-append: a partial trailing record
        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("{\"record\":\"entry\",\"sequence\":2,\"ki");
        fs::write(&path, raw).unwrap();

        let contents = read_records(&path).unwrap();
        assert_eq!(contents.entries, vec![e1]);
    }

    #[test]
    fn test_interior_damage_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        let mut writer = JournalWriter::create(&path, &header()).unwrap();
        writer
            .append(&JournalEntry::create(1, PathBuf::from("/library/a.png")))
            .unwrap();
        writer
            .append(&JournalEntry::create(2, PathBuf::from("/library/b.png")))
            .unwrap();
        drop(writer);

        let raw = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = raw.lines().map(String::from).collect();
        lines[1] = "not json".to_string();
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        let result = read_records(&path);
        assert!(matches!(result, Err(RewindError::CorruptJournal(_))));
    }

    #[test]
    fn test_out_of_order_sequences_are_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        let mut writer = JournalWriter::create(&path, &header()).unwrap();
        writer
            .append(&JournalEntry::create(2, PathBuf::from("/library/a.png")))
            .unwrap();
        writer
            .append(&JournalEntry::create(1, PathBuf::from("/library/b.png")))
            .unwrap();
        drop(writer);

        let result = read_records(&path);
        assert!(matches!(result, Err(RewindError::CorruptJournal(_))));
    }

    #[test]
    fn test_incompatible_header_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        let mut h = header();
        h.format_version = JOURNAL_FORMAT_VERSION + 1;
        let line = serde_json::to_string(&JournalRecord::Header(h)).unwrap();
        fs::write(&path, line + "\n{\"bad\":1}\n{\"bad\":2}\n").unwrap();

        let result = read_records(&path);
        assert!(matches!(result, Err(RewindError::CorruptJournal(_))));
    }

    #[test]
    fn test_header_only_journal_reads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        JournalWriter::create(&path, &header()).unwrap();

        let contents = read_records(&path).unwrap();
        assert!(contents.header.is_some());
        assert!(contents.entries.is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");

        JournalWriter::create(&path, &header()).unwrap();
        delete(&path).unwrap();
        assert!(!path.exists());
        delete(&path).unwrap();
    }
}
