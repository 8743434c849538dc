//! Test utilities for jnote_core
//!
//! This module provides a filesystem wrapper that counts writes and can be told
//! to fail them, and a scratch vault fixture wired to an in-memory index.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::active_note::NoteContext;
use crate::config::Config;
use crate::document::{Block, NoteDocument};
use crate::fs::{FileSystem, RealFileSystem};
use crate::index::{DirectoryRecord, IndexStore, MemoryIndex, NoteRecord, note_file_path};

/// Real filesystem that counts `write_file` calls and can fail them on demand.
#[derive(Debug, Default)]
pub struct CountingFs {
    inner: RealFileSystem,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl CountingFs {
    /// Create a new counting filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `write_file` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail with `PermissionDenied`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "writes disabled by test",
            ));
        }
        Ok(())
    }
}

impl FileSystem for CountingFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.inner.read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> io::Result<()> {
        self.check_writable()?;
        self.inner.write_file(path, content)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_new(&self, path: &Path, content: &str) -> io::Result<()> {
        self.check_writable()?;
        self.inner.create_new(path, content)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.inner.delete_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.inner.rename(from, to)
    }

    fn list_files(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.list_files(dir)
    }

    fn get_modified_time(&self, path: &Path) -> Option<f64> {
        self.inner.get_modified_time(path)
    }

    fn open_reader(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        self.inner.open_reader(path)
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        self.inner.canonicalize(path)
    }
}

/// A scratch vault in a temporary directory.
pub struct TestVault {
    /// Owns the directory; dropped with the fixture
    pub dir: tempfile::TempDir,
    /// Filesystem handed to notes
    pub fs: Arc<CountingFs>,
    /// Index handed to notes
    pub index: Arc<MemoryIndex>,
    /// Ready-to-use note context
    pub ctx: NoteContext,
    /// Config the context was built from
    pub config: Config,
}

impl TestVault {
    /// Create an empty vault whose notes save after `debounce_ms`.
    pub fn new(debounce_ms: u64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let mut config = Config::new(root.clone());
        config.debounce_ms = debounce_ms;

        let fs = Arc::new(CountingFs::new());
        let index = Arc::new(MemoryIndex::new());
        index.upsert_directory(&DirectoryRecord::root(root)).unwrap();

        let ctx = NoteContext::new(&config, index.clone(), fs.clone());
        Self {
            dir,
            fs,
            index,
            ctx,
            config,
        }
    }

    /// Vault root.
    pub fn root(&self) -> &Path {
        &self.config.vault_root
    }

    /// Write a note at the vault root and index it. Not counted as a write.
    pub fn add_note(&self, title: &str, blocks: Vec<Block>) -> (String, PathBuf) {
        self.add_note_in(&self.config.vault_root.clone(), title, blocks)
    }

    /// Write a note in `dir` (created if needed) and index it.
    pub fn add_note_in(&self, dir: &Path, title: &str, blocks: Vec<Block>) -> (String, PathBuf) {
        std::fs::create_dir_all(dir).unwrap();
        let mut doc = NoteDocument::create_new(title);
        doc.blocks = blocks;
        let path = note_file_path(dir, doc.id());
        std::fs::write(&path, doc.to_json_string().unwrap()).unwrap();
        self.index
            .upsert_note(&NoteRecord::from_header(&doc.metadata, dir))
            .unwrap();
        (doc.id().to_string(), path)
    }

    /// Overwrite a note file the way another program would.
    pub fn write_external(&self, path: &Path, doc: &NoteDocument) {
        std::fs::write(path, doc.to_json_string().unwrap()).unwrap();
    }
}
