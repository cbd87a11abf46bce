/*!
Undo engine: replays a persisted journal in reverse to restore the pre-run
tree.

The pass is best-effort: a failing entry is recorded and the remaining
entries are still attempted, so one unreadable backup never blocks the rest
of the restoration. Only a pass with zero failures consumes the journal and
its backup area; anything less leaves both on disk for diagnosis and retry.
Every individual step (delete-if-present, restore-by-overwrite) is safe to
repeat, so a retry after a partial failure simply replays the whole journal
again.
*/

use crate::backup::{BackupStore, DirBackupStore};
use crate::entry::{JournalEntry, OpKind};
use crate::journal::{self, read_records};
use crate::layout::RunLayout;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One entry that could not be restored or deleted during an undo pass
#[derive(Debug, Clone, PartialEq)]
pub struct EntryFailure {
    /// Sequence number of the failing entry
    pub sequence: u64,
    /// Target path the entry refers to
    pub path: PathBuf,
    /// Human-readable reason
    pub reason: String,
}

/// Aggregated result of one undo pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoReport {
    /// Entries that undid cleanly
    pub entries_undone: usize,
    /// Entries that failed, in reverse sequence order (the order attempted)
    pub failures: Vec<EntryFailure>,
}

/// Terminal state of an undo pass
#[derive(Debug, Clone, PartialEq)]
pub enum UndoOutcome {
    /// No journal exists for the root; there is nothing to undo
    NothingToUndo,
    /// Every entry undid cleanly; journal and backups are gone
    Succeeded {
        /// Number of entries that were undone
        entries_undone: usize,
    },
    /// At least one entry failed; journal and backups are retained
    PartiallyFailed(UndoReport),
}

/// Replays one run's journal in reverse
pub struct UndoEngine<B: BackupStore> {
    journal_path: PathBuf,
    backups: B,
    root: PathBuf,
}

impl<B: BackupStore> UndoEngine<B> {
    /// Create an engine over a journal file, its backup store, and the
    /// processed root (the boundary for best-effort directory cleanup)
    pub fn new(journal_path: PathBuf, backups: B, root: PathBuf) -> Self {
        Self {
            journal_path,
            backups,
            root,
        }
    }

    /// Run one undo pass
    ///
    /// A missing journal is not an error. Interior journal corruption is:
    /// nothing is replayed from a journal that cannot be read coherently.
    pub fn undo(&self) -> Result<UndoOutcome> {
        if !self.journal_path.exists() {
            info!(root = %self.root.display(), "no journal found, nothing to undo");
            return Ok(UndoOutcome::NothingToUndo);
        }

        let contents = read_records(&self.journal_path)?;
        info!(
            entries = contents.entries.len(),
            journal = %self.journal_path.display(),
            "undo pass started"
        );

        let mut report = UndoReport::default();
        let mut pruned_parents: Vec<PathBuf> = Vec::new();

        for entry in contents.entries.iter().rev() {
            match self.undo_entry(entry) {
                Ok(()) => {
                    report.entries_undone += 1;
                    if entry.kind == OpKind::Create {
                        if let Some(parent) = entry.target_path.parent() {
                            pruned_parents.push(parent.to_path_buf());
                        }
                    }
                }
                Err(reason) => {
                    warn!(
                        sequence = entry.sequence,
                        path = %entry.target_path.display(),
                        "undo entry failed: {reason}"
                    );
                    report.failures.push(EntryFailure {
                        sequence: entry.sequence,
                        path: entry.target_path.clone(),
                        reason,
                    });
                }
            }
        }

        if !report.failures.is_empty() {
            warn!(
                failed = report.failures.len(),
                undone = report.entries_undone,
                "undo pass partially failed, journal and backups retained"
            );
            return Ok(UndoOutcome::PartiallyFailed(report));
        }

        // Single disposal unit: journal and backups go together, and only
        // after every entry undid without error.
        journal::delete(&self.journal_path)?;
        self.backups.dispose()?;

        for parent in pruned_parents {
            prune_empty_dirs(&parent, &self.root);
        }

        info!(undone = report.entries_undone, "undo pass succeeded");
        Ok(UndoOutcome::Succeeded {
            entries_undone: report.entries_undone,
        })
    }

    fn undo_entry(&self, entry: &JournalEntry) -> std::result::Result<(), String> {
        match entry.kind {
            OpKind::Create => self.undo_create(&entry.target_path),
            OpKind::Modify => self.undo_modify(entry),
        }
    }

    /// Delete a created file; absence is tolerated, not an error
    fn undo_create(&self, target: &Path) -> std::result::Result<(), String> {
        if !target.exists() {
            return Ok(());
        }
        if target.is_dir() {
            return Err("expected a file but found a directory".to_string());
        }
        fs::remove_file(target).map_err(|e| format!("failed to delete: {e}"))
    }

    /// Overwrite a modified file with its captured pre-image
    fn undo_modify(&self, entry: &JournalEntry) -> std::result::Result<(), String> {
        let backup_ref = entry
            .backup_ref
            .ok_or_else(|| "modify entry has no backup reference".to_string())?;

        let bytes = self
            .backups
            .fetch(backup_ref)
            .map_err(|e| format!("backup unavailable: {e}"))?;
        entry
            .verify_integrity(&bytes)
            .map_err(|e| format!("backup corrupted: {e}"))?;

        if let Some(parent) = entry.target_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("failed to recreate parent directory: {e}"))?;
            }
        }
        fs::write(&entry.target_path, &bytes).map_err(|e| format!("failed to restore: {e}"))
    }
}

/// Remove now-empty directories left behind by deleted creations, walking up
/// to (but never including) the processed root. Best-effort: a non-empty
/// directory stops the walk, and failures are ignored.
fn prune_empty_dirs(start: &Path, root: &Path) {
    let mut dir = start;
    while dir.starts_with(root) && dir != root {
        if fs::remove_dir(dir).is_err() {
            break;
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => break,
        }
    }
}

/// Undo the most recent run over `layout`, disposing of the scratch
/// directory once journal and backups are gone
pub fn undo_run(layout: &RunLayout) -> Result<UndoOutcome> {
    let engine = UndoEngine::new(
        layout.journal_path(),
        DirBackupStore::new(layout.backup_dir()),
        layout.root().to_path_buf(),
    );
    let outcome = engine.undo()?;
    if !matches!(outcome, UndoOutcome::PartiallyFailed(_)) {
        layout.remove_scratch_if_empty();
    }
    Ok(outcome)
}
