//! Disk operations on notes and directories.
//!
//! Each operation changes the filesystem and then updates the index right
//! away, so callers see the result without waiting for the watcher. When the
//! watcher later reports the same change, its upserts and deletes are no-ops.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::NoteDocument;
use crate::error::{JnoteError, Result};
use crate::fs::FileSystem;
use crate::index::{DirectoryRecord, IndexStore, NoteRecord, SubtreeStats, note_file_path};
use crate::path_utils::{is_within, path_key};

/// A note written by [`Vault::create_note`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedNote {
    /// New note id
    pub note_id: String,
    /// File path
    pub path: PathBuf,
    /// File modification time after the write
    pub mtime: f64,
}

/// The vault directory tree on disk.
#[derive(Clone)]
pub struct Vault {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    index: Arc<dyn IndexStore>,
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(JnoteError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Vault {
    /// Wrap the vault at `root`.
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>, index: Arc<dyn IndexStore>) -> Self {
        Self { root, fs, index }
    }

    /// Vault root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fail unless `dir` is an existing directory inside the vault.
    fn require_dir(&self, dir: &Path) -> Result<()> {
        if !is_within(&path_key(dir), &path_key(&self.root)) || !self.fs.is_dir(dir) {
            return Err(JnoteError::DirectoryNotFound(dir.to_path_buf()));
        }
        Ok(())
    }

    /// Fail unless `dir` is a directory strictly inside the vault.
    fn require_subdir(&self, dir: &Path) -> Result<()> {
        self.require_dir(dir)?;
        if dir == self.root {
            return Err(JnoteError::InvalidName(path_key(dir)));
        }
        Ok(())
    }

    /// Write a new empty note into `dir` and index it.
    pub fn create_note(&self, dir: &Path, title: &str) -> Result<CreatedNote> {
        self.require_dir(dir)?;

        let doc = NoteDocument::create_new(title);
        let path = note_file_path(dir, doc.id());
        let content = doc.to_json_string()?;
        self.fs.create_new(&path, &content).map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                JnoteError::AlreadyExists(path.clone())
            } else {
                JnoteError::FileWrite {
                    path: path.clone(),
                    source: e,
                }
            }
        })?;
        let mtime = self
            .fs
            .get_modified_time(&path)
            .unwrap_or_else(crate::now_secs);

        if dir != self.root && self.index.get_directory(dir)?.is_none() {
            self.index
                .upsert_directory(&DirectoryRecord::new(dir.to_path_buf()))?;
        }
        let record = NoteRecord::from_header(&doc.metadata, dir);
        if !self.index.insert_note(&record)? {
            self.index.upsert_note(&record)?;
        }

        log::info!("Created note '{}' ({})", title, doc.id());
        Ok(CreatedNote {
            note_id: doc.id().to_string(),
            path,
            mtime,
        })
    }

    /// Delete a note's file and its index entry.
    ///
    /// A file that is already gone only has its index entry removed.
    pub fn delete_note(&self, note_id: &str) -> Result<()> {
        let record = self
            .index
            .get_note(note_id)?
            .ok_or_else(|| JnoteError::NotIndexed(note_id.to_string()))?;
        let path = record.file_path();
        match self.fs.delete_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Note file {} was already gone", path.display());
            }
            Err(e) => return Err(JnoteError::FileWrite { path, source: e }),
        }
        self.index.delete_note(note_id)?;
        log::info!("Deleted note {}", note_id);
        Ok(())
    }

    /// Create `parent/name`. Fails if it already exists.
    pub fn create_directory(&self, parent: &Path, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        self.require_dir(parent)?;

        let path = parent.join(name);
        if self.fs.exists(&path) {
            return Err(JnoteError::AlreadyExists(path));
        }
        self.fs.create_dir(&path).map_err(|e| JnoteError::FileWrite {
            path: path.clone(),
            source: e,
        })?;
        self.index
            .upsert_directory(&DirectoryRecord::new(path.clone()))?;

        log::info!("Created directory {}", path.display());
        Ok(path)
    }

    /// Rename a directory in place and rewrite everything beneath it in the index.
    pub fn rename_directory(&self, old_path: &Path, new_name: &str) -> Result<PathBuf> {
        validate_name(new_name)?;
        self.require_subdir(old_path)?;

        let parent = old_path
            .parent()
            .ok_or_else(|| JnoteError::DirectoryNotFound(old_path.to_path_buf()))?;
        let new_path = parent.join(new_name);
        if self.fs.exists(&new_path) {
            return Err(JnoteError::AlreadyExists(new_path));
        }
        self.fs
            .rename(old_path, &new_path)
            .map_err(|e| JnoteError::FileWrite {
                path: old_path.to_path_buf(),
                source: e,
            })?;
        let stats = self
            .index
            .rename_directory_subtree(old_path, &new_path, new_name)?;

        log::info!(
            "Renamed directory {} -> {} ({} notes moved)",
            old_path.display(),
            new_path.display(),
            stats.notes
        );
        Ok(new_path)
    }

    /// Delete a directory and everything beneath it.
    pub fn delete_directory(&self, path: &Path) -> Result<SubtreeStats> {
        self.require_subdir(path)?;

        self.fs
            .remove_dir_all(path)
            .map_err(|e| JnoteError::FileWrite {
                path: path.to_path_buf(),
                source: e,
            })?;
        let stats = self.index.delete_directory_subtree(path)?;

        log::warn!(
            "Deleted directory {} ({} notes, {} directories)",
            path.display(),
            stats.notes,
            stats.directories
        );
        Ok(stats)
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("root", &self.root).finish()
    }
}
