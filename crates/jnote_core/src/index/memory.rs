//! In-memory index backed by ordered maps.
//!
//! Directories are keyed by their string path in a `BTreeMap`, so every
//! descendant of a directory is found with one range scan starting at its
//! separator-terminated prefix.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use super::{
    DirectoryListing, DirectoryRecord, FolderEntry, IndexResult, IndexStore, NoteEntry,
    NoteRecord, SubtreeStats, renamed_parent,
};
use crate::path_utils::{child_prefix, is_within, path_key, rewrite_prefix};

#[derive(Debug, Default)]
struct Tables {
    notes: BTreeMap<String, NoteRecord>,
    directories: BTreeMap<String, DirectoryRecord>,
}

impl Tables {
    /// Keys of strict descendants of `key`.
    fn descendant_keys(&self, key: &str) -> Vec<String> {
        let prefix = child_prefix(key);
        self.directories
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn notes_within(&self, key: &str) -> Vec<String> {
        self.notes
            .values()
            .filter(|n| is_within(&path_key(&n.directory), key))
            .map(|n| n.note_id.clone())
            .collect()
    }
}

/// In-memory vault index.
///
/// A single lock guards both tables, so recursive operations are atomic.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    tables: RwLock<Tables>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryIndex {
    fn upsert_note(&self, record: &NoteRecord) -> IndexResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.notes.insert(record.note_id.clone(), record.clone());
        Ok(())
    }

    fn insert_note(&self, record: &NoteRecord) -> IndexResult<bool> {
        let mut tables = self.tables.write().unwrap();
        if tables.notes.contains_key(&record.note_id) {
            log::error!("Note insert rejected (integrity): {}", record.note_id);
            return Ok(false);
        }
        tables.notes.insert(record.note_id.clone(), record.clone());
        Ok(true)
    }

    fn upsert_directory(&self, record: &DirectoryRecord) -> IndexResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables
            .directories
            .insert(path_key(&record.path), record.clone());
        Ok(())
    }

    fn get_note(&self, note_id: &str) -> IndexResult<Option<NoteRecord>> {
        Ok(self.tables.read().unwrap().notes.get(note_id).cloned())
    }

    fn get_directory(&self, path: &Path) -> IndexResult<Option<DirectoryRecord>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .directories
            .get(&path_key(path))
            .cloned())
    }

    fn list_notes(&self) -> IndexResult<Vec<NoteRecord>> {
        Ok(self.tables.read().unwrap().notes.values().cloned().collect())
    }

    fn list_directories(&self) -> IndexResult<Vec<DirectoryRecord>> {
        Ok(self
            .tables
            .read()
            .unwrap()
            .directories
            .values()
            .cloned()
            .collect())
    }

    fn directory_contents(&self, path: &Path) -> IndexResult<DirectoryListing> {
        let tables = self.tables.read().unwrap();

        let mut folders: Vec<FolderEntry> = tables
            .directories
            .values()
            .filter(|d| d.parent_path.as_deref() == Some(path))
            .map(|d| FolderEntry {
                path: d.path.clone(),
                name: d.name.clone(),
            })
            .collect();
        folders.sort_by(|a, b| a.name.cmp(&b.name));

        let mut notes: Vec<NoteEntry> = tables
            .notes
            .values()
            .filter(|n| n.directory == path)
            .map(|n| NoteEntry {
                note_id: n.note_id.clone(),
                title: n.title.clone(),
            })
            .collect();
        notes.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.note_id.cmp(&b.note_id)));

        Ok(DirectoryListing {
            path: path.to_path_buf(),
            folders,
            notes,
        })
    }

    fn delete_note(&self, note_id: &str) -> IndexResult<bool> {
        Ok(self.tables.write().unwrap().notes.remove(note_id).is_some())
    }

    fn delete_directory_subtree(&self, path: &Path) -> IndexResult<SubtreeStats> {
        let key = path_key(path);
        let mut tables = self.tables.write().unwrap();

        let mut stats = SubtreeStats::default();
        for id in tables.notes_within(&key) {
            tables.notes.remove(&id);
            stats.notes += 1;
        }
        if tables.directories.remove(&key).is_some() {
            stats.directories += 1;
        }
        for k in tables.descendant_keys(&key) {
            tables.directories.remove(&k);
            stats.directories += 1;
        }
        Ok(stats)
    }

    fn rename_directory_subtree(
        &self,
        old_path: &Path,
        new_path: &Path,
        new_name: &str,
    ) -> IndexResult<SubtreeStats> {
        let old_key = path_key(old_path);
        let new_key = path_key(new_path);
        let mut tables = self.tables.write().unwrap();
        let mut stats = SubtreeStats::default();

        let old_record = tables.directories.remove(&old_key);
        if old_record.is_some() {
            stats.directories += 1;
        }
        let parent_path = renamed_parent(old_record.as_ref(), new_path);
        tables.directories.insert(
            new_key.clone(),
            DirectoryRecord {
                path: new_path.to_path_buf(),
                name: new_name.to_string(),
                parent_path,
            },
        );

        for k in tables.descendant_keys(&old_key) {
            let Some(mut record) = tables.directories.remove(&k) else {
                continue;
            };
            if let Some(moved) = rewrite_prefix(&k, &old_key, &new_key) {
                record.path = PathBuf::from(&moved);
                record.parent_path = record
                    .parent_path
                    .as_deref()
                    .and_then(|p| rewrite_prefix(&path_key(p), &old_key, &new_key))
                    .map(PathBuf::from);
                tables.directories.insert(moved, record);
                stats.directories += 1;
            }
        }

        for id in tables.notes_within(&old_key) {
            if let Some(note) = tables.notes.get_mut(&id)
                && let Some(moved) = rewrite_prefix(&path_key(&note.directory), &old_key, &new_key)
            {
                note.directory = PathBuf::from(moved);
                stats.notes += 1;
            }
        }

        Ok(stats)
    }

    fn clear(&self) -> IndexResult<()> {
        let mut tables = self.tables.write().unwrap();
        tables.notes.clear();
        tables.directories.clear();
        Ok(())
    }
}
