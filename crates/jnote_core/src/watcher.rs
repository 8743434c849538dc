//! Filesystem watcher for the vault.
//!
//! [`scan_vault`] bootstraps the index by walking the vault once.
//! [`VaultWatcher`] then keeps it current: it runs a `notify` watcher on the
//! vault root, bridges raw events over a channel to a worker thread, reduces
//! them to [`WatchEvent`]s and hands each one to a [`VaultEventHandler`].
//!
//! The handler updates the index and then reports `(path, mtime)` to its
//! listener. Failures on this path (an unreadable header, an index error, a
//! panicking listener) are logged and the worker moves on to the next event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};

use crate::document::{CURRENT_NOTE_VERSION, extract_header, note_id_from_path};
use crate::error::Result;
use crate::fs::{FileSystem, is_note_file};
use crate::index::{DirectoryRecord, IndexStore, NoteRecord};
use crate::path_utils::{is_within, path_key};

/// Receives `(absolute path, modification time)` after each relevant change.
pub type ChangeListener = Arc<dyn Fn(&Path, f64) + Send + Sync>;

/// A filesystem change, reduced to what the vault cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A file or directory appeared.
    Created {
        /// New path
        path: PathBuf,
        /// Whether the path is a directory
        is_dir: bool,
    },
    /// File content changed.
    Modified {
        /// Changed path
        path: PathBuf,
    },
    /// A file or directory disappeared.
    Removed {
        /// Old path
        path: PathBuf,
        /// Whether the path was known to be a directory
        is_dir: bool,
    },
    /// A file or directory was renamed within the vault.
    Moved {
        /// Old path
        from: PathBuf,
        /// New path
        to: PathBuf,
        /// Whether the path is a directory
        is_dir: bool,
    },
}

/// Reduce a raw `notify` event to vault events.
///
/// Metadata-only changes and access events produce nothing.
pub fn classify(event: notify::Event) -> Vec<WatchEvent> {
    let notify::Event { kind, paths, .. } = event;
    match kind {
        EventKind::Create(kind) => paths
            .into_iter()
            .map(|path| {
                let is_dir = kind == CreateKind::Folder || path.is_dir();
                WatchEvent::Created { path, is_dir }
            })
            .collect(),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to] => vec![WatchEvent::Moved {
                from: from.clone(),
                is_dir: to.is_dir(),
                to: to.clone(),
            }],
            _ => Vec::new(),
        },
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => paths
            .into_iter()
            .map(|path| WatchEvent::Removed {
                path,
                is_dir: false,
            })
            .collect(),
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    let is_dir = path.is_dir();
                    WatchEvent::Created { path, is_dir }
                } else {
                    WatchEvent::Removed {
                        path,
                        is_dir: false,
                    }
                }
            })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => paths
            .into_iter()
            .filter(|path| !path.is_dir())
            .map(|path| WatchEvent::Modified { path })
            .collect(),

        EventKind::Remove(kind) => paths
            .into_iter()
            .map(|path| WatchEvent::Removed {
                path,
                is_dir: kind == RemoveKind::Folder,
            })
            .collect(),

        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

/// Counts from a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanStats {
    /// Directories indexed, including the root
    pub directories: usize,
    /// Note files indexed
    pub notes: usize,
}

/// Build the index record for a note file.
///
/// Only the header is parsed. If it cannot be read the record falls back to
/// the file stem for both id and title, so the note stays reachable.
fn note_record_for<FS: FileSystem + ?Sized>(fs: &FS, path: &Path) -> Option<NoteRecord> {
    let directory = path.parent()?;
    match extract_header(fs, path) {
        Ok(header) => Some(NoteRecord::from_header(&header, directory)),
        Err(e) => {
            log::error!("Metadata extraction failed for {}: {}", path.display(), e);
            let stem = note_id_from_path(path)?;
            Some(NoteRecord {
                title: stem.clone(),
                note_id: stem,
                version: CURRENT_NOTE_VERSION.to_string(),
                directory: directory.to_path_buf(),
            })
        }
    }
}

/// Walk `root` once, upserting every directory and note header.
///
/// Safe to re-run: every write is an upsert.
pub fn scan_vault<FS: FileSystem + ?Sized>(
    fs: &FS,
    index: &dyn IndexStore,
    root: &Path,
) -> Result<ScanStats> {
    log::info!("Starting vault scan of {}", root.display());
    let mut stats = ScanStats::default();
    index.upsert_directory(&DirectoryRecord::root(root.to_path_buf()))?;
    stats.directories += 1;
    scan_dir(fs, index, root, &mut stats)?;
    log::info!(
        "Vault scan complete: {} directories, {} notes",
        stats.directories,
        stats.notes
    );
    Ok(stats)
}

fn scan_dir<FS: FileSystem + ?Sized>(
    fs: &FS,
    index: &dyn IndexStore,
    dir: &Path,
    stats: &mut ScanStats,
) -> Result<()> {
    let mut entries = fs.list_files(dir)?;
    entries.sort();
    for entry in entries {
        if fs.is_dir(&entry) {
            index.upsert_directory(&DirectoryRecord::new(entry.clone()))?;
            stats.directories += 1;
            if let Err(e) = scan_dir(fs, index, &entry, stats) {
                log::warn!("Skipping unreadable directory {}: {}", entry.display(), e);
            }
        } else if is_note_file(&entry)
            && let Some(record) = note_record_for(fs, &entry)
        {
            index.upsert_note(&record)?;
            stats.notes += 1;
        }
    }
    Ok(())
}

/// Applies [`WatchEvent`]s to the index and notifies a listener.
pub struct VaultEventHandler {
    root: PathBuf,
    index: Arc<dyn IndexStore>,
    fs: Arc<dyn FileSystem>,
    listener: Option<ChangeListener>,
}

impl VaultEventHandler {
    /// Create a handler for the vault at `root`.
    pub fn new(root: PathBuf, index: Arc<dyn IndexStore>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root,
            index,
            fs,
            listener: None,
        }
    }

    /// Set the listener notified after each relevant change.
    pub fn with_listener(mut self, listener: ChangeListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply one event. Never panics and never returns an error; failures are logged.
    pub fn handle(&self, event: &WatchEvent) {
        let result = catch_unwind(AssertUnwindSafe(|| self.apply(event)));
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Failed to process {:?}: {}", event, e),
            Err(_) => log::error!("Panic while processing {:?}", event),
        }
    }

    fn apply(&self, event: &WatchEvent) -> Result<()> {
        match event {
            WatchEvent::Created { path, is_dir } => self.on_created(path, *is_dir),
            WatchEvent::Modified { path } => self.on_modified(path),
            WatchEvent::Removed { path, is_dir } => self.on_removed(path, *is_dir),
            WatchEvent::Moved { from, to, is_dir } => self.on_moved(from, to, *is_dir),
        }
    }

    fn on_created(&self, path: &Path, is_dir: bool) -> Result<()> {
        if is_dir {
            log::debug!("Watcher: created directory {}", path.display());
            self.ensure_ancestors(path)?;
            self.index
                .upsert_directory(&DirectoryRecord::new(path.to_path_buf()))?;
            // A directory moved in from outside arrives with its contents.
            let mut stats = ScanStats::default();
            scan_dir(&*self.fs, &*self.index, path, &mut stats)?;
            self.notify(path);
        } else if is_note_file(path) {
            self.process_note_file(path)?;
        }
        Ok(())
    }

    fn on_modified(&self, path: &Path) -> Result<()> {
        if is_note_file(path) {
            self.process_note_file(path)?;
        }
        Ok(())
    }

    fn on_removed(&self, path: &Path, is_dir: bool) -> Result<()> {
        if is_dir || self.index.get_directory(path)?.is_some() {
            let stats = self.index.delete_directory_subtree(path)?;
            log::warn!(
                "Watcher: removed directory {} ({} notes, {} subdirectories)",
                path.display(),
                stats.notes,
                stats.directories.saturating_sub(1)
            );
            self.notify(path);
        } else if is_note_file(path) {
            if let Some(note_id) = note_id_from_path(path) {
                self.index.delete_note(&note_id)?;
                log::info!("Watcher: removed note {}", note_id);
            }
            self.notify(path);
        }
        Ok(())
    }

    fn on_moved(&self, from: &Path, to: &Path, is_dir: bool) -> Result<()> {
        log::info!("Watcher: moved {} -> {}", from.display(), to.display());
        if is_dir {
            let name = to
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.ensure_ancestors(to)?;
            self.index.rename_directory_subtree(from, to, &name)?;
            self.notify(to);
        } else if is_note_file(to) {
            self.process_note_file(to)?;
        } else if is_note_file(from) {
            self.on_removed(from, false)?;
        }
        Ok(())
    }

    fn process_note_file(&self, path: &Path) -> Result<()> {
        if let Some(record) = note_record_for(&*self.fs, path) {
            self.ensure_ancestors(path)?;
            log::debug!("Watcher: indexed note {}", record.note_id);
            self.index.upsert_note(&record)?;
        }
        self.notify(path);
        Ok(())
    }

    /// Index every directory between the root and `path` (exclusive) that is missing.
    fn ensure_ancestors(&self, path: &Path) -> Result<()> {
        let root = path_key(&self.root);
        let mut missing = Vec::new();
        let mut current = path.parent();
        while let Some(dir) = current {
            let key = path_key(dir);
            if key == root || !is_within(&key, &root) {
                break;
            }
            if self.index.get_directory(dir)?.is_some() {
                break;
            }
            missing.push(dir.to_path_buf());
            current = dir.parent();
        }
        for dir in missing.into_iter().rev() {
            self.index.upsert_directory(&DirectoryRecord::new(dir))?;
        }
        Ok(())
    }

    fn notify(&self, path: &Path) {
        let Some(listener) = &self.listener else {
            return;
        };
        let mtime = self
            .fs
            .get_modified_time(path)
            .unwrap_or_else(crate::now_secs);
        let result = catch_unwind(AssertUnwindSafe(|| listener(path, mtime)));
        if result.is_err() {
            log::warn!("Change listener failed for {}", path.display());
        }
    }
}

impl std::fmt::Debug for VaultEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultEventHandler")
            .field("root", &self.root)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}

enum Message {
    Fs(notify::Result<notify::Event>),
    Stop,
}

/// Background watcher for a vault.
///
/// Events are processed on a dedicated worker thread in the order `notify`
/// delivers them. Dropping the watcher stops it.
pub struct VaultWatcher {
    watcher: Option<RecommendedWatcher>,
    control: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl VaultWatcher {
    /// Start watching `handler.root()` recursively.
    pub fn start(handler: Arc<VaultEventHandler>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Message>();

        let bridge = tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = bridge.send(Message::Fs(res));
        })?;
        watcher.watch(handler.root(), RecursiveMode::Recursive)?;

        let worker_handler = Arc::clone(&handler);
        let worker = thread::Builder::new()
            .name("jnote-watcher".to_string())
            .spawn(move || {
                for message in rx {
                    match message {
                        Message::Fs(Ok(event)) => {
                            for change in classify(event) {
                                worker_handler.handle(&change);
                            }
                        }
                        Message::Fs(Err(e)) => log::warn!("Filesystem watcher error: {}", e),
                        Message::Stop => break,
                    }
                }
            })?;

        log::info!("Watching vault at {}", handler.root().display());
        Ok(Self {
            watcher: Some(watcher),
            control: tx,
            worker: Some(worker),
        })
    }

    /// Stop watching and wait for the worker to finish the event in progress.
    pub fn stop(&mut self) {
        if self.watcher.take().is_none() {
            return;
        }
        let _ = self.control.send(Message::Stop);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            log::warn!("Watcher thread panicked");
        }
        log::info!("Vault watcher stopped");
    }

    /// Whether [`stop`](Self::stop) has not been called yet.
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }
}

impl Drop for VaultWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for VaultWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultWatcher")
            .field("running", &self.is_running())
            .finish()
    }
}
