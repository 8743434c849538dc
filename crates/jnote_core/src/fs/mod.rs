//! Filesystem abstraction module.
//!
//! This module provides the `FileSystem` trait for abstracting the disk
//! operations the vault needs, so that tests can wrap the real filesystem
//! (for example to count writes or inject failures).
//!
//! It also owns the outbound event port: [`VaultEvent`]s are emitted by the
//! state layer and fanned out to subscribers through a [`CallbackRegistry`].

mod callback_registry;
mod events;
mod native;

pub use callback_registry::{CallbackRegistry, EventCallback, SubscriptionId};
pub use events::VaultEvent;
pub use native::RealFileSystem;

use std::io::{Cursor, Read, Result};
use std::path::{Path, PathBuf};

/// File extension of note documents.
pub const NOTE_EXTENSION: &str = "jnote";

/// Whether a path names a note document.
pub fn is_note_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == NOTE_EXTENSION)
}

/// Abstraction over filesystem operations.
/// Send + Sync required because notes are flushed and reloaded from worker threads.
pub trait FileSystem: Send + Sync {
    /// Reads the whole file content
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Overwrites a file, creating it if needed
    fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Creates a file ONLY if it doesn't exist.
    /// Should return an error if file exists.
    fn create_new(&self, path: &Path, content: &str) -> Result<()>;

    /// Deletes a file
    fn delete_file(&self, path: &Path) -> Result<()>;

    /// Checks if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Checks if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Creates a single directory; errors if it already exists
    fn create_dir(&self, path: &Path) -> Result<()>;

    /// Creates a directory and all parent directories
    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Removes a directory and everything beneath it
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Rename a file or directory.
    ///
    /// Should error if the source does not exist or if the destination already exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// List all entries in a directory (not recursive)
    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Modification time of a file in seconds since the Unix epoch
    fn get_modified_time(&self, path: &Path) -> Option<f64>;

    /// Read binary file content
    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        self.read_to_string(path).map(|s| s.into_bytes())
    }

    /// Open a file for streaming reads.
    ///
    /// The default buffers the whole file; native implementations stream from disk.
    fn open_reader(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let bytes = self.read_binary(path)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    /// Resolve a path to its absolute, canonical form.
    ///
    /// Falls back to the path as given when it cannot be resolved.
    fn canonicalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

impl<T: FileSystem + ?Sized> FileSystem for std::sync::Arc<T> {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        (**self).read_to_string(path)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        (**self).write_file(path, content)
    }

    fn create_new(&self, path: &Path, content: &str) -> Result<()> {
        (**self).create_new(path, content)
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        (**self).delete_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        (**self).is_dir(path)
    }

    fn create_dir(&self, path: &Path) -> Result<()> {
        (**self).create_dir(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        (**self).create_dir_all(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        (**self).remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        (**self).rename(from, to)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        (**self).list_files(dir)
    }

    fn get_modified_time(&self, path: &Path) -> Option<f64> {
        (**self).get_modified_time(path)
    }

    fn read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        (**self).read_binary(path)
    }

    fn open_reader(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        (**self).open_reader(path)
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        (**self).canonicalize(path)
    }
}
