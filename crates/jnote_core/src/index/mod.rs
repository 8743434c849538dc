//! Vault index.
//!
//! The index maps note ids to where their files live, and directory paths to
//! their place in the tree. It is the only way an id is resolved to a path.
//!
//! Two backends implement [`IndexStore`]:
//!
//! - [`SqliteIndex`]: persistent (or in-memory) SQLite database
//! - [`MemoryIndex`]: ordered in-memory maps, used in tests and for scratch vaults
//!
//! # Consistency rules
//!
//! - Every mutation is atomic: readers never observe half of a subtree rename.
//! - Recursive operations select descendants with a separator-terminated
//!   prefix (see [`crate::path_utils`]), so `/vault/A` never matches `/vault/ABackup`.
//! - Upserts are idempotent, which is what makes re-running a full scan safe.

mod memory;
mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::document::NoteHeader;
use crate::error::JnoteError;
use crate::fs::NOTE_EXTENSION;

/// Result type for index operations.
pub type IndexResult<T> = Result<T, JnoteError>;

/// Index entry for a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    /// Stable note id
    pub note_id: String,
    /// Display title
    pub title: String,
    /// Version tag from the header
    pub version: String,
    /// Directory containing the note file
    pub directory: PathBuf,
}

impl NoteRecord {
    /// Build a record from an extracted header and the directory it was found in.
    pub fn from_header(header: &NoteHeader, directory: &Path) -> Self {
        Self {
            note_id: header.note_id.clone(),
            title: header.title.clone(),
            version: header.version.clone(),
            directory: directory.to_path_buf(),
        }
    }

    /// Path of the note file: `<directory>/<note_id>.jnote`.
    pub fn file_path(&self) -> PathBuf {
        note_file_path(&self.directory, &self.note_id)
    }
}

/// Path of the file for `note_id` inside `directory`.
pub fn note_file_path(directory: &Path, note_id: &str) -> PathBuf {
    directory.join(format!("{}.{}", note_id, NOTE_EXTENSION))
}

/// Index entry for a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Full path (primary key)
    pub path: PathBuf,
    /// Last path component
    pub name: String,
    /// Parent directory; `None` only for the vault root
    pub parent_path: Option<PathBuf>,
}

impl DirectoryRecord {
    /// Record for a directory beneath the vault root.
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let parent_path = path.parent().map(Path::to_path_buf);
        Self {
            path,
            name,
            parent_path,
        }
    }

    /// Record for the vault root itself.
    pub fn root(path: PathBuf) -> Self {
        Self {
            parent_path: None,
            ..Self::new(path)
        }
    }
}

/// A folder shown in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    /// Full path of the folder
    pub path: PathBuf,
    /// Folder name
    pub name: String,
}

/// A note shown in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEntry {
    /// Note id
    pub note_id: String,
    /// Display title
    pub title: String,
}

/// Immediate children of a directory, as the navigation tree shows them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectoryListing {
    /// Listed directory
    pub path: PathBuf,
    /// Sub-folders, sorted by name
    pub folders: Vec<FolderEntry>,
    /// Notes, sorted by title
    pub notes: Vec<NoteEntry>,
}

/// Number of records touched by a recursive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubtreeStats {
    /// Note records deleted or rewritten
    pub notes: usize,
    /// Directory records deleted or rewritten
    pub directories: usize,
}

/// Trait for index storage backends.
///
/// Implementations must be safe to share between the watcher thread and any
/// number of reader threads.
pub trait IndexStore: Send + Sync {
    /// Insert or replace a note record.
    fn upsert_note(&self, record: &NoteRecord) -> IndexResult<()>;

    /// Insert a note record that must not exist yet.
    ///
    /// Returns `Ok(false)` on a uniqueness violation; the caller decides
    /// whether to treat it as an update.
    fn insert_note(&self, record: &NoteRecord) -> IndexResult<bool>;

    /// Insert or replace a directory record.
    fn upsert_directory(&self, record: &DirectoryRecord) -> IndexResult<()>;

    /// Look up a note by id.
    fn get_note(&self, note_id: &str) -> IndexResult<Option<NoteRecord>>;

    /// Look up a directory by path.
    fn get_directory(&self, path: &Path) -> IndexResult<Option<DirectoryRecord>>;

    /// All notes, ordered by id.
    fn list_notes(&self) -> IndexResult<Vec<NoteRecord>>;

    /// All directories, ordered by path.
    fn list_directories(&self) -> IndexResult<Vec<DirectoryRecord>>;

    /// Immediate children of a directory.
    fn directory_contents(&self, path: &Path) -> IndexResult<DirectoryListing>;

    /// Delete a note record. Returns `true` if it existed.
    fn delete_note(&self, note_id: &str) -> IndexResult<bool>;

    /// Delete a directory, every descendant directory and every note inside them.
    fn delete_directory_subtree(&self, path: &Path) -> IndexResult<SubtreeStats>;

    /// Move a directory record to `new_path` / `new_name` and rewrite the paths
    /// of every descendant directory and contained note by prefix substitution.
    fn rename_directory_subtree(
        &self,
        old_path: &Path,
        new_path: &Path,
        new_name: &str,
    ) -> IndexResult<SubtreeStats>;

    /// Remove every record (used before a fresh rescan).
    fn clear(&self) -> IndexResult<()>;
}

/// Parent of a renamed directory: roots stay roots, others follow the new path.
pub(crate) fn renamed_parent(old: Option<&DirectoryRecord>, new_path: &Path) -> Option<PathBuf> {
    match old {
        Some(record) if record.parent_path.is_none() => None,
        _ => new_path.parent().map(Path::to_path_buf),
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behavior every [`IndexStore`] backend must share.

    use super::*;

    fn dir(path: &str) -> DirectoryRecord {
        DirectoryRecord::new(PathBuf::from(path))
    }

    fn note(id: &str, directory: &str) -> NoteRecord {
        NoteRecord {
            note_id: id.to_string(),
            title: format!("Title {id}"),
            version: "1.0".to_string(),
            directory: PathBuf::from(directory),
        }
    }

    fn seed(store: &dyn IndexStore) {
        store
            .upsert_directory(&DirectoryRecord::root(PathBuf::from("/vault")))
            .unwrap();
        for d in ["/vault/A", "/vault/A/sub", "/vault/A/sub/deep", "/vault/ABackup", "/vault/AX"] {
            store.upsert_directory(&dir(d)).unwrap();
        }
        store.upsert_note(&note("root-note", "/vault")).unwrap();
        store.upsert_note(&note("a1", "/vault/A")).unwrap();
        store.upsert_note(&note("a2", "/vault/A/sub")).unwrap();
        store.upsert_note(&note("a3", "/vault/A/sub/deep")).unwrap();
        store.upsert_note(&note("backup", "/vault/ABackup")).unwrap();
        store.upsert_note(&note("ax", "/vault/AX")).unwrap();
    }

    pub fn upsert_and_lookup(store: &dyn IndexStore) {
        let mut record = note("n1", "/vault");
        store.upsert_note(&record).unwrap();
        assert_eq!(store.get_note("n1").unwrap(), Some(record.clone()));

        record.title = "Renamed".to_string();
        store.upsert_note(&record).unwrap();
        assert_eq!(store.get_note("n1").unwrap().unwrap().title, "Renamed");
        assert_eq!(store.list_notes().unwrap().len(), 1);

        assert!(store.get_note("missing").unwrap().is_none());
        assert!(store.delete_note("n1").unwrap());
        assert!(!store.delete_note("n1").unwrap());
    }

    pub fn insert_reports_duplicates(store: &dyn IndexStore) {
        let record = note("dup", "/vault");
        assert!(store.insert_note(&record).unwrap());
        assert!(!store.insert_note(&record).unwrap());
        assert_eq!(store.list_notes().unwrap().len(), 1);
    }

    pub fn subtree_delete_is_prefix_safe(store: &dyn IndexStore) {
        seed(store);
        let stats = store.delete_directory_subtree(Path::new("/vault/A")).unwrap();
        assert_eq!(stats, SubtreeStats { notes: 3, directories: 3 });

        for gone in ["a1", "a2", "a3"] {
            assert!(store.get_note(gone).unwrap().is_none(), "{gone} survived");
        }
        for kept in ["root-note", "backup", "ax"] {
            assert!(store.get_note(kept).unwrap().is_some(), "{kept} was deleted");
        }
        assert!(store.get_directory(Path::new("/vault/A")).unwrap().is_none());
        assert!(store.get_directory(Path::new("/vault/A/sub/deep")).unwrap().is_none());
        assert!(store.get_directory(Path::new("/vault/ABackup")).unwrap().is_some());
        assert!(store.get_directory(Path::new("/vault/AX")).unwrap().is_some());
    }

    pub fn subtree_rename_is_prefix_safe(store: &dyn IndexStore) {
        seed(store);
        let stats = store
            .rename_directory_subtree(Path::new("/vault/A"), Path::new("/vault/B"), "B")
            .unwrap();
        assert_eq!(stats, SubtreeStats { notes: 3, directories: 3 });

        let b = store.get_directory(Path::new("/vault/B")).unwrap().unwrap();
        assert_eq!(b.name, "B");
        assert_eq!(b.parent_path, Some(PathBuf::from("/vault")));
        assert!(store.get_directory(Path::new("/vault/A")).unwrap().is_none());

        let deep = store
            .get_directory(Path::new("/vault/B/sub/deep"))
            .unwrap()
            .unwrap();
        assert_eq!(deep.name, "deep");
        assert_eq!(deep.parent_path, Some(PathBuf::from("/vault/B/sub")));

        assert_eq!(
            store.get_note("a1").unwrap().unwrap().directory,
            PathBuf::from("/vault/B")
        );
        assert_eq!(
            store.get_note("a3").unwrap().unwrap().directory,
            PathBuf::from("/vault/B/sub/deep")
        );
        assert_eq!(
            store.get_note("backup").unwrap().unwrap().directory,
            PathBuf::from("/vault/ABackup")
        );
        let backup = store.get_directory(Path::new("/vault/ABackup")).unwrap().unwrap();
        assert_eq!(backup.name, "ABackup");
    }

    pub fn contents_lists_immediate_children(store: &dyn IndexStore) {
        seed(store);
        let listing = store.directory_contents(Path::new("/vault")).unwrap();
        let folders: Vec<_> = listing.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(folders, vec!["A", "ABackup", "AX"]);
        let notes: Vec<_> = listing.notes.iter().map(|n| n.note_id.as_str()).collect();
        assert_eq!(notes, vec!["root-note"]);

        let listing = store.directory_contents(Path::new("/vault/A")).unwrap();
        assert_eq!(listing.folders.len(), 1);
        assert_eq!(listing.notes.len(), 1);
    }

    pub fn clear_removes_everything(store: &dyn IndexStore) {
        seed(store);
        store.clear().unwrap();
        assert!(store.list_notes().unwrap().is_empty());
        assert!(store.list_directories().unwrap().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_file_path() {
        let record = NoteRecord {
            note_id: "abc".to_string(),
            title: "T".to_string(),
            version: "1.0".to_string(),
            directory: PathBuf::from("/vault/dir"),
        };
        assert_eq!(record.file_path(), PathBuf::from("/vault/dir/abc.jnote"));
    }

    #[test]
    fn test_directory_record_from_path() {
        let record = DirectoryRecord::new(PathBuf::from("/vault/Projects"));
        assert_eq!(record.name, "Projects");
        assert_eq!(record.parent_path, Some(PathBuf::from("/vault")));

        let root = DirectoryRecord::root(PathBuf::from("/vault"));
        assert!(root.parent_path.is_none());
        assert_eq!(root.name, "vault");
    }
}
