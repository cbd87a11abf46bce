/*!
# rewind core engine

Transactional file-operation journal and rollback engine for library
processing runs.

A run over a media library mutates files through independent collaborators:
metadata scrapers, artwork downloaders, XML generators, parallel video
workers. This crate records every one of those mutations in a durable,
append-only journal, captures full pre-images of files before they are
overwritten, and can later replay the journal in reverse to restore the tree
to its exact pre-run state.

## Architecture

- [`Recorder`] — the write API every mutating collaborator calls; serializes
  concurrent callers into one totally-ordered journal.
- [`BackupStore`] / [`DirBackupStore`] — pre-image storage, one backup per
  recorded modification.
- [`journal`] — line-oriented durable persistence with truncated-tail
  tolerance.
- [`UndoEngine`] / [`undo_run`] — best-effort reverse replay; disposes of
  journal and backups only after a fully clean pass.

## Usage

```no_run
use rewind_core::{Recorder, RunLayout, undo_run};

// At run start, the entry point opens the journal and shares the recorder
// with every collaborator:
let layout = RunLayout::new("/library")?;
let recorder = Recorder::begin(&layout)?;

recorder.record_modify("/library/gamelist.xml")?;
std::fs::write("/library/gamelist.xml", "<games><game/></games>")?;

// Later, a separate invocation rolls the whole run back:
let outcome = undo_run(&layout)?;
# Ok::<(), rewind_core::RewindError>(())
```
*/

pub mod backup;
pub mod entry;
pub mod error;
pub mod journal;
pub mod layout;
pub mod recorder;
pub mod undo;

pub use backup::{BackupStore, DirBackupStore};
pub use entry::{
    BackupId, JournalEntry, JournalHeader, JournalRecord, OpKind, JOURNAL_FORMAT_VERSION,
};
pub use error::{Result, RewindError};
pub use journal::{JournalContents, JournalWriter};
pub use layout::RunLayout;
pub use recorder::Recorder;
pub use undo::{undo_run, EntryFailure, UndoEngine, UndoOutcome, UndoReport};
