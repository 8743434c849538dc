//! The in-memory copy of one open note.
//!
//! An [`ActiveNote`] owns the document for as long as the note is open and
//! keeps it consistent with the file on disk:
//!
//! - Edits are applied in memory, mark the note dirty and arm a debounce timer.
//!   When the timer fires the document is written once, however many edits
//!   happened in between.
//! - After a write, the file's modification time is kept as the *echo
//!   watermark*. A change notification whose timestamp is within the tolerance
//!   of the watermark is the note's own write coming back and is ignored.
//! - Any other change notification starts a *hot-swap*: the file is read on a
//!   worker thread without holding the note's lock, and the result is applied
//!   only if nothing was edited while the read was in flight.
//! - Every write looks the note up in the index first. A note whose directory
//!   was renamed follows it; a note that was deleted is closed and its file is
//!   not recreated.
//!
//! All mutable state sits behind one mutex. The debounce thread holds only a
//! weak reference, so an open note never keeps itself alive.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::Value;

use crate::blocks::{BlockParams, BlockRegistry};
use crate::config::Config;
use crate::debounce::DebounceTimer;
use crate::document::{Block, NoteDocument, load_document, save_document};
use crate::error::{JnoteError, Result};
use crate::fs::{CallbackRegistry, FileSystem, VaultEvent};
use crate::index::IndexStore;

/// Shared services an open note needs.
#[derive(Clone)]
pub struct NoteContext {
    /// Index used to resolve note ids to paths
    pub index: Arc<dyn IndexStore>,
    /// Filesystem notes are read from and written to
    pub fs: Arc<dyn FileSystem>,
    /// Builders for new blocks
    pub blocks: Arc<BlockRegistry>,
    /// Outbound event fan-out
    pub events: Arc<CallbackRegistry>,
    /// Quiet period before a dirty note is written
    pub debounce: Duration,
    /// Echo tolerance in seconds
    pub echo_tolerance: f64,
}

impl NoteContext {
    /// Context with default block types, a fresh event registry and timings from `config`.
    pub fn new(config: &Config, index: Arc<dyn IndexStore>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            index,
            fs,
            blocks: Arc::new(BlockRegistry::with_defaults()),
            events: Arc::new(CallbackRegistry::new()),
            debounce: config.debounce(),
            echo_tolerance: config.echo_tolerance_secs(),
        }
    }
}

impl std::fmt::Debug for NoteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteContext")
            .field("debounce", &self.debounce)
            .field("echo_tolerance", &self.echo_tolerance)
            .finish_non_exhaustive()
    }
}

/// What a change notification led to.
#[derive(Debug)]
pub enum ExternalChange {
    /// The path is not this note's file, or the note is closed.
    Ignored,
    /// The timestamp matched the echo watermark.
    Echo,
    /// The note has unsaved edits, so the disk copy was not read.
    Skipped,
    /// A hot-swap was started on a worker thread.
    Reloading(JoinHandle<HotSwapOutcome>),
}

/// Result of a hot-swap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotSwapOutcome {
    /// The disk copy replaced the in-memory document.
    Applied,
    /// The note was edited while the disk read was in flight; the disk copy was dropped.
    Aborted,
    /// The file could not be read or parsed; the in-memory document was kept.
    Failed,
    /// The note was closed before the swap could be applied.
    Closed,
}

/// A document read from disk, not yet applied.
#[derive(Debug)]
pub struct DiskSnapshot {
    document: NoteDocument,
    path: PathBuf,
    mtime: f64,
    revision: u64,
}

impl DiskSnapshot {
    /// The document as read.
    pub fn document(&self) -> &NoteDocument {
        &self.document
    }

    /// File the document was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time observed before the read.
    pub fn mtime(&self) -> f64 {
        self.mtime
    }
}

#[derive(Debug)]
struct NoteState {
    document: NoteDocument,
    /// Current location; follows directory renames.
    path: PathBuf,
    dirty: bool,
    watermark: f64,
    /// Bumped by every edit; lets a hot-swap detect edits made during its read.
    revision: u64,
    placeholder: bool,
    closed: bool,
}

struct NoteInner {
    note_id: String,
    ctx: NoteContext,
    state: Mutex<NoteState>,
    timer: OnceLock<DebounceTimer>,
}

/// Handle to an open note. Clones share the same state.
#[derive(Clone)]
pub struct ActiveNote {
    inner: Arc<NoteInner>,
}

impl NoteInner {
    fn lock(&self) -> MutexGuard<'_, NoteState> {
        self.state.lock().unwrap()
    }

    fn arm_timer(&self) {
        if let Some(timer) = self.timer.get() {
            timer.arm();
        }
    }

    fn stop_timer(&self) {
        if let Some(timer) = self.timer.get() {
            timer.shutdown();
        }
    }

    /// Point the note at `path`. Returns `true` if it moved.
    fn relocate(&self, state: &mut NoteState, path: PathBuf) -> bool {
        if path == state.path {
            return false;
        }
        log::info!(
            "Note {} moved: {} -> {}",
            self.note_id,
            state.path.display(),
            path.display()
        );
        state.path = path;
        true
    }

    /// Write the document if dirty. Must be called with the lock held.
    ///
    /// The target is resolved through the index. If the note is no longer
    /// indexed and its file is gone, the note was deleted: nothing is written,
    /// the note is marked closed and `NotIndexed` is returned.
    ///
    /// Returns the event to emit once the lock is released.
    fn write_locked(&self, state: &mut NoteState) -> (Result<bool>, Option<VaultEvent>) {
        if !state.dirty {
            return (Ok(false), None);
        }
        match self.ctx.index.get_note(&self.note_id) {
            Ok(Some(record)) => {
                self.relocate(state, record.file_path());
            }
            Ok(None) if !self.ctx.fs.exists(&state.path) => {
                log::warn!(
                    "Note {} was deleted while open, discarding unsaved edits",
                    self.note_id
                );
                state.dirty = false;
                state.closed = true;
                return (
                    Err(JnoteError::NotIndexed(self.note_id.clone())),
                    Some(VaultEvent::note_deleted(&self.note_id, state.path.clone())),
                );
            }
            Ok(None) => {
                log::warn!(
                    "Note {} is missing from the index, saving to {}",
                    self.note_id,
                    state.path.display()
                );
            }
            Err(e) => {
                log::error!("Could not resolve path of note {}: {}", self.note_id, e);
            }
        }
        match save_document(&*self.ctx.fs, &state.path, &state.document) {
            Ok(mtime) => {
                state.watermark = mtime;
                state.dirty = false;
                state.placeholder = false;
                log::info!("Saved note {} ({})", self.note_id, state.path.display());
                (
                    Ok(true),
                    Some(VaultEvent::note_saved(&self.note_id, state.path.clone(), mtime)),
                )
            }
            Err(e) => {
                log::error!("Failed to save note {}: {}", self.note_id, e);
                let event = VaultEvent::save_failed(&self.note_id, e.to_string());
                (Err(e), Some(event))
            }
        }
    }

    fn emit(&self, event: Option<VaultEvent>) {
        if let Some(event) = event {
            self.ctx.events.emit(&event);
        }
    }

    /// Timer callback.
    fn flush_debounced(&self) {
        let (event, deleted) = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            let (_, event) = self.write_locked(&mut state);
            (event, state.closed)
        };
        self.emit(event);
        if deleted {
            self.stop_timer();
        }
    }
}

impl ActiveNote {
    /// Open a note by id.
    ///
    /// Fails with [`JnoteError::NotIndexed`] for an unknown id and
    /// [`JnoteError::NotFoundOnDisk`] when the indexed file is gone. A file that
    /// exists but cannot be read or parsed opens as an empty placeholder so it
    /// can still be edited or closed.
    pub fn open(note_id: &str, ctx: &NoteContext) -> Result<Self> {
        let record = ctx
            .index
            .get_note(note_id)?
            .ok_or_else(|| JnoteError::NotIndexed(note_id.to_string()))?;
        let path = record.file_path();

        let (document, placeholder) = match load_document(&*ctx.fs, &path) {
            Ok(document) => (document, false),
            Err(e @ (JnoteError::CorruptDocument { .. } | JnoteError::FileRead { .. })) => {
                log::error!("Opening note {} as placeholder: {}", note_id, e);
                (NoteDocument::placeholder(note_id), true)
            }
            Err(e) => return Err(e),
        };
        let watermark = ctx.fs.get_modified_time(&path).unwrap_or(0.0);

        let inner = Arc::new(NoteInner {
            note_id: note_id.to_string(),
            ctx: ctx.clone(),
            state: Mutex::new(NoteState {
                document,
                path,
                dirty: false,
                watermark,
                revision: 0,
                placeholder,
                closed: false,
            }),
            timer: OnceLock::new(),
        });

        let weak = Arc::downgrade(&inner);
        let timer = DebounceTimer::new(ctx.debounce, move || {
            if let Some(inner) = weak.upgrade() {
                inner.flush_debounced();
            }
        })?;
        let _ = inner.timer.set(timer);

        let note = Self { inner };
        log::debug!("Opened note {} ({})", note_id, note.path().display());
        Ok(note)
    }

    /// Note id.
    pub fn id(&self) -> &str {
        &self.inner.note_id
    }

    /// Current file path of the note.
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Re-read the note's location from the index. Returns `true` if it moved.
    pub fn refresh_path(&self) -> Result<bool> {
        let record = self.inner.ctx.index.get_note(&self.inner.note_id)?;
        let mut state = self.inner.lock();
        match record {
            Some(record) if !state.closed => {
                Ok(self.inner.relocate(&mut state, record.file_path()))
            }
            _ => Ok(false),
        }
    }

    /// Snapshot of the current document.
    pub fn document(&self) -> NoteDocument {
        self.inner.lock().document.clone()
    }

    /// Snapshot of the current blocks.
    pub fn blocks(&self) -> Vec<Block> {
        self.inner.lock().document.blocks.clone()
    }

    /// Whether there are edits not yet on disk.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Modification time of this note's last own write (or of the file at open).
    pub fn echo_watermark(&self) -> f64 {
        self.inner.lock().watermark
    }

    /// Whether the note was opened as a placeholder for an unreadable file.
    pub fn is_placeholder(&self) -> bool {
        self.inner.lock().placeholder
    }

    /// Whether [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Whether two handles refer to the same open instance.
    pub fn same_instance(&self, other: &ActiveNote) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Apply an edit under the lock, then arm the save timer.
    fn mutate<T>(&self, edit: impl FnOnce(&mut NoteDocument) -> Result<T>) -> Result<T> {
        let result = {
            let mut state = self.inner.lock();
            if state.closed {
                return Err(JnoteError::NoteNotOpen(self.inner.note_id.clone()));
            }
            let result = edit(&mut state.document)?;
            state.document.metadata.touch();
            state.dirty = true;
            state.revision += 1;
            result
        };
        self.inner.arm_timer();
        Ok(result)
    }

    /// Create a block of `block_type` and insert it after `after_block_id`
    /// (or at the end when absent or not found). Returns the new block.
    pub fn add_block(
        &self,
        block_type: &str,
        params: &BlockParams,
        after_block_id: Option<&str>,
    ) -> Result<Block> {
        let block = self.inner.ctx.blocks.create(block_type, params);
        self.mutate(|doc| {
            match after_block_id {
                Some(after) => {
                    doc.insert_block_after(after, block.clone());
                }
                None => doc.append_block(block.clone()),
            }
            Ok(block)
        })
    }

    /// Replace the payload of a block.
    pub fn update_block(&self, block_id: &str, data: Value) -> Result<()> {
        let note_id = self.inner.note_id.clone();
        self.mutate(|doc| {
            if doc.replace_block_data(block_id, data) {
                Ok(())
            } else {
                Err(JnoteError::BlockNotFound {
                    note_id,
                    block_id: block_id.to_string(),
                })
            }
        })
    }

    /// Remove a block.
    pub fn delete_block(&self, block_id: &str) -> Result<()> {
        let note_id = self.inner.note_id.clone();
        self.mutate(|doc| {
            if doc.remove_block(block_id) {
                Ok(())
            } else {
                Err(JnoteError::BlockNotFound {
                    note_id,
                    block_id: block_id.to_string(),
                })
            }
        })
    }

    /// Write pending edits now. Returns `true` if anything was written.
    ///
    /// On failure the note stays dirty and the next edit or close retries.
    /// A note that was deleted from the vault is closed instead, and
    /// [`JnoteError::NotIndexed`] is returned.
    pub fn flush(&self) -> Result<bool> {
        if let Some(timer) = self.inner.timer.get() {
            timer.cancel();
        }
        let (result, event, closed) = {
            let mut state = self.inner.lock();
            let (result, event) = self.inner.write_locked(&mut state);
            (result, event, state.closed)
        };
        self.inner.emit(event);
        if closed {
            self.inner.stop_timer();
        }
        result
    }

    /// Handle a change notification for `path` with timestamp `mtime`.
    pub fn handle_external_update(&self, path: &Path, mtime: f64) -> Result<ExternalChange> {
        if !self.is_own_path(path) {
            return Ok(ExternalChange::Ignored);
        }
        {
            let state = self.inner.lock();
            if state.closed {
                return Ok(ExternalChange::Ignored);
            }
            if (mtime - state.watermark).abs() < self.inner.ctx.echo_tolerance {
                log::debug!("Ignoring echo of own write for note {}", self.inner.note_id);
                return Ok(ExternalChange::Echo);
            }
            if state.dirty {
                drop(state);
                log::warn!(
                    "External change to note {} ignored: local edits win",
                    self.inner.note_id
                );
                let event = VaultEvent::hot_swap_aborted(&self.inner.note_id);
                self.inner.emit(Some(event));
                return Ok(ExternalChange::Skipped);
            }
        }

        log::info!("External change to note {}, reloading", self.inner.note_id);
        let note = self.clone();
        let handle = thread::Builder::new()
            .name("jnote-hotswap".to_string())
            .spawn(move || note.hot_swap(mtime))?;
        Ok(ExternalChange::Reloading(handle))
    }

    fn is_own_path(&self, path: &Path) -> bool {
        let own = self.path();
        if path == own {
            return true;
        }
        let fs = &self.inner.ctx.fs;
        fs.canonicalize(path) == fs.canonicalize(&own)
    }

    /// Read the file and apply it if the note is unchanged since the read began.
    pub fn hot_swap(&self, notified_mtime: f64) -> HotSwapOutcome {
        match self.read_snapshot(notified_mtime) {
            Ok(snapshot) => self.apply_snapshot(snapshot),
            Err(e) => {
                log::error!("Reload of note {} failed: {}", self.inner.note_id, e);
                HotSwapOutcome::Failed
            }
        }
    }

    /// First half of a hot-swap: read and parse the file without holding the lock.
    pub fn read_snapshot(&self, notified_mtime: f64) -> Result<DiskSnapshot> {
        let (revision, path) = {
            let state = self.inner.lock();
            (state.revision, state.path.clone())
        };
        let fs = &*self.inner.ctx.fs;
        let mtime = fs.get_modified_time(&path).unwrap_or(notified_mtime);
        let document = load_document(fs, &path)?;
        Ok(DiskSnapshot {
            document,
            path,
            mtime,
            revision,
        })
    }

    /// Second half of a hot-swap: re-check under the lock, then replace.
    pub fn apply_snapshot(&self, snapshot: DiskSnapshot) -> HotSwapOutcome {
        let note_id = &self.inner.note_id;
        let (outcome, event) = {
            let mut state = self.inner.lock();
            if state.closed {
                (HotSwapOutcome::Closed, None)
            } else if state.dirty || state.revision != snapshot.revision {
                log::warn!("Hot-swap of note {} aborted: local edits win", note_id);
                (
                    HotSwapOutcome::Aborted,
                    Some(VaultEvent::hot_swap_aborted(note_id)),
                )
            } else {
                state.document = snapshot.document;
                state.watermark = snapshot.mtime;
                state.placeholder = false;
                (
                    HotSwapOutcome::Applied,
                    Some(VaultEvent::note_reloaded(note_id, snapshot.path)),
                )
            }
        };
        self.inner.emit(event);
        outcome
    }

    /// Flush pending edits and stop the save timer.
    ///
    /// If the final write fails the note stays open and dirty and the error is
    /// returned, so the caller can retry. A note deleted from the vault closes
    /// without writing.
    pub fn close(&self) -> Result<()> {
        let event = {
            let mut state = self.inner.lock();
            if state.closed {
                return Ok(());
            }
            let (result, event) = self.inner.write_locked(&mut state);
            if let Err(e) = result
                && !state.closed
            {
                drop(state);
                self.inner.emit(event);
                return Err(e);
            }
            state.closed = true;
            event
        };
        self.inner.emit(event);

        // The timer thread may be waiting on the note lock, so join it unlocked.
        self.inner.stop_timer();
        log::debug!("Closed note {}", self.inner.note_id);
        Ok(())
    }
}

impl std::fmt::Debug for ActiveNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveNote")
            .field("note_id", &self.inner.note_id)
            .finish_non_exhaustive()
    }
}
