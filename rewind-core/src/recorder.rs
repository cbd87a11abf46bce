/*!
Recorder: the public write API collaborators call as they mutate files.

One recorder is created at run start and handed to every mutating
collaborator (metadata scrapers, image downloaders, XML generators, parallel
video workers). It is cheap to clone and safe to share across a worker pool:
sequence-number assignment and the durable journal append form a single
mutex-guarded critical section, while pre-image backup writes run outside it
in parallel.
*/

use crate::backup::{BackupStore, DirBackupStore};
use crate::entry::{compute_hash, JournalEntry, JournalHeader};
use crate::journal::JournalWriter;
use crate::layout::RunLayout;
use crate::{Result, RewindError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

struct WriterState {
    journal: JournalWriter,
    next_sequence: u64,
}

struct Shared<B: BackupStore> {
    backups: B,
    writer: Mutex<WriterState>,
}

/// Write API for one run's transaction journal
///
/// Both record calls block until their journal append is durable;
/// [`record_modify`](Recorder::record_modify) additionally blocks until the
/// pre-image backup is durable. That rendezvous is what guarantees a crash
/// never leaves a mutation whose pre-image was not captured.
///
/// # Example
/// ```no_run
/// use rewind_core::{Recorder, RunLayout};
///
/// let layout = RunLayout::new("/library")?;
/// let recorder = Recorder::begin(&layout)?;
///
/// // Collaborator about to overwrite gamelist.xml:
/// recorder.record_modify("/library/gamelist.xml")?;
/// std::fs::write("/library/gamelist.xml", "<games><game/></games>")?;
///
/// // Collaborator that just downloaded a poster:
/// recorder.record_create("/library/images/poster.png")?;
/// # Ok::<(), rewind_core::RewindError>(())
/// ```
pub struct Recorder<B: BackupStore = DirBackupStore> {
    shared: Arc<Shared<B>>,
}

impl<B: BackupStore> Clone for Recorder<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Recorder<DirBackupStore> {
    /// Open a fresh journal for a run over `layout` and return its recorder
    ///
    /// The header record is durable before this returns. Any journal left by
    /// a previous run at the same root is replaced; runs do not merge.
    pub fn begin(layout: &RunLayout) -> Result<Self> {
        let header = JournalHeader::new(layout.root().to_path_buf());
        let journal = JournalWriter::create(&layout.journal_path(), &header)?;
        let backups = DirBackupStore::new(layout.backup_dir());

        info!(run_id = %header.run_id, root = %layout.root().display(), "run journal opened");
        Ok(Self::new(journal, backups))
    }
}

impl<B: BackupStore> Recorder<B> {
    /// Create a recorder over an already-open journal and backup store
    pub fn new(journal: JournalWriter, backups: B) -> Self {
        Self {
            shared: Arc::new(Shared {
                backups,
                writer: Mutex::new(WriterState {
                    journal,
                    next_sequence: 1,
                }),
            }),
        }
    }

    /// Record that `path` was (or is about to be) created by this run
    ///
    /// The durable append completes before this returns. A crash between the
    /// real file creation and this call leaves an unrecorded orphan
    /// creation; that window is an accepted risk of the design.
    pub fn record_create<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let target = canonical_target(path.as_ref())?;
        let sequence = self.append_with_next_sequence(|sequence| {
            JournalEntry::create(sequence, target.clone())
        })?;

        debug!(sequence, target = %target.display(), "recorded create");
        Ok(sequence)
    }

    /// Record that `path` is about to be modified, capturing its pre-image
    ///
    /// The full current bytes of `path` are copied into the backup store and
    /// the Modify entry is durably appended before this returns; only then
    /// may the caller perform its mutating write. If the backup copy fails
    /// the call fails and the caller must not proceed with the mutation.
    pub fn record_modify<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RewindError::TargetMissing(path.to_path_buf()));
        }
        let target = canonical_target(path)?;

        // Pre-image capture runs outside the critical section; each backup
        // goes to its own file, so concurrent callers do not contend here.
        let bytes = fs::read(&target)?;
        let hash = compute_hash(&bytes);
        let backup_ref = self.shared.backups.store(&bytes)?;

        let sequence = self.append_with_next_sequence(|sequence| {
            JournalEntry::modify(sequence, target.clone(), backup_ref, hash.clone())
        })?;

        debug!(
            sequence,
            target = %target.display(),
            backup = %backup_ref,
            "recorded modify"
        );
        Ok(sequence)
    }

    /// Assign the next sequence number and durably append in one critical
    /// section, so concurrent callers see no gaps, duplicates, or reordering
    fn append_with_next_sequence<F>(&self, build: F) -> Result<u64>
    where
        F: FnOnce(u64) -> JournalEntry,
    {
        let mut writer = self
            .shared
            .writer
            .lock()
            .map_err(|_| RewindError::journal("recorder lock poisoned"))?;

        let sequence = writer.next_sequence;
        writer.journal.append(&build(sequence))?;
        writer.next_sequence = sequence + 1;
        Ok(sequence)
    }
}

/// Resolve a target to a canonical absolute path
///
/// `record_create` may be called for a path that does not exist yet, so the
/// parent directory is canonicalized and the file name re-joined in that
/// case.
fn canonical_target(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }

    let file_name = path.file_name().ok_or_else(|| {
        RewindError::validation(format!("Target has no file name: {}", path.display()))
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.canonicalize()?,
        _ => std::env::current_dir()?,
    };
    Ok(parent.join(file_name))
}
