//! SQLite-backed index.
//!
//! Two tables: `notes` keyed by note id, and `directories` keyed by full path.
//! Descendant selection uses `substr(col, 1, length(prefix)) = prefix` with a
//! separator-terminated prefix, which keeps `_` and `%` in directory names from
//! acting as wildcards the way they would under `LIKE`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};

use super::{
    DirectoryListing, DirectoryRecord, FolderEntry, IndexResult, IndexStore, NoteEntry,
    NoteRecord, SubtreeStats, renamed_parent,
};
use crate::path_utils::{child_prefix, path_key};

/// SQLite-backed vault index.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex`; every operation holds it for its
/// whole duration, and recursive operations additionally run in a transaction.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<NoteRecord> {
    Ok(NoteRecord {
        note_id: row.get(0)?,
        title: row.get(1)?,
        version: row.get(2)?,
        directory: PathBuf::from(row.get::<_, String>(3)?),
    })
}

fn directory_from_row(row: &Row<'_>) -> rusqlite::Result<DirectoryRecord> {
    Ok(DirectoryRecord {
        path: PathBuf::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        parent_path: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
    })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SqliteIndex {
    /// Open or create an index database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or if schema
    /// initialization fails.
    pub fn open<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let conn = Connection::open(path)?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    /// Create an in-memory index. Data is lost when the index is dropped.
    pub fn in_memory() -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        let index = Self {
            conn: Mutex::new(conn),
        };
        index.init_schema()?;
        Ok(index)
    }

    fn init_schema(&self) -> IndexResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                note_id TEXT PRIMARY KEY,
                note_title TEXT NOT NULL,
                note_version TEXT NOT NULL,
                note_dir TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS directories (
                dir_path TEXT PRIMARY KEY,
                dir_name TEXT NOT NULL,
                parent_path TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_note_dir ON notes(note_dir);
            CREATE INDEX IF NOT EXISTS idx_parent_path ON directories(parent_path);
            "#,
        )?;
        Ok(())
    }
}

impl IndexStore for SqliteIndex {
    fn upsert_note(&self, record: &NoteRecord) -> IndexResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO notes (note_id, note_title, note_version, note_dir, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.note_id,
                record.title,
                record.version,
                path_key(&record.directory),
                now_millis()
            ],
        )?;
        Ok(())
    }

    fn insert_note(&self, record: &NoteRecord) -> IndexResult<bool> {
        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO notes (note_id, note_title, note_version, note_dir, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.note_id,
                record.title,
                record.version,
                path_key(&record.directory),
                now_millis()
            ],
        );
        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                log::error!("Note insert rejected (integrity): {}", record.note_id);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn upsert_directory(&self, record: &DirectoryRecord) -> IndexResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO directories (dir_path, dir_name, parent_path) VALUES (?, ?, ?)",
            params![
                path_key(&record.path),
                record.name,
                record.parent_path.as_deref().map(path_key)
            ],
        )?;
        Ok(())
    }

    fn get_note(&self, note_id: &str) -> IndexResult<Option<NoteRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT note_id, note_title, note_version, note_dir FROM notes WHERE note_id = ?",
                params![note_id],
                note_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn get_directory(&self, path: &Path) -> IndexResult<Option<DirectoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT dir_path, dir_name, parent_path FROM directories WHERE dir_path = ?",
                params![path_key(path)],
                directory_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn list_notes(&self) -> IndexResult<Vec<NoteRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT note_id, note_title, note_version, note_dir FROM notes ORDER BY note_id",
        )?;
        let rows = stmt.query_map([], note_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn list_directories(&self) -> IndexResult<Vec<DirectoryRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT dir_path, dir_name, parent_path FROM directories ORDER BY dir_path")?;
        let rows = stmt.query_map([], directory_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn directory_contents(&self, path: &Path) -> IndexResult<DirectoryListing> {
        let key = path_key(path);
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT dir_path, dir_name FROM directories WHERE parent_path = ? ORDER BY dir_name",
        )?;
        let folders = stmt
            .query_map(params![key], |row| {
                Ok(FolderEntry {
                    path: PathBuf::from(row.get::<_, String>(0)?),
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT note_id, note_title FROM notes WHERE note_dir = ? ORDER BY note_title, note_id",
        )?;
        let notes = stmt
            .query_map(params![key], |row| {
                Ok(NoteEntry {
                    note_id: row.get(0)?,
                    title: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DirectoryListing {
            path: path.to_path_buf(),
            folders,
            notes,
        })
    }

    fn delete_note(&self, note_id: &str) -> IndexResult<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM notes WHERE note_id = ?", params![note_id])?;
        Ok(removed > 0)
    }

    fn delete_directory_subtree(&self, path: &Path) -> IndexResult<SubtreeStats> {
        let key = path_key(path);
        let prefix = child_prefix(&key);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let notes = tx.execute(
            "DELETE FROM notes
             WHERE note_dir = ?1 OR substr(note_dir, 1, length(?2)) = ?2",
            params![key, prefix],
        )?;
        let directories = tx.execute(
            "DELETE FROM directories
             WHERE dir_path = ?1 OR substr(dir_path, 1, length(?2)) = ?2",
            params![key, prefix],
        )?;
        tx.commit()?;

        log::debug!(
            "Deleted subtree {}: {} notes, {} directories",
            key,
            notes,
            directories
        );
        Ok(SubtreeStats { notes, directories })
    }

    fn rename_directory_subtree(
        &self,
        old_path: &Path,
        new_path: &Path,
        new_name: &str,
    ) -> IndexResult<SubtreeStats> {
        let old_key = path_key(old_path);
        let new_key = path_key(new_path);
        let old_prefix = child_prefix(&old_key);

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let old_record = tx
            .query_row(
                "SELECT dir_path, dir_name, parent_path FROM directories WHERE dir_path = ?",
                params![old_key],
                directory_from_row,
            )
            .optional()?;
        let parent = renamed_parent(old_record.as_ref(), new_path);

        let mut directories = tx.execute("DELETE FROM directories WHERE dir_path = ?", params![old_key])?;
        tx.execute(
            "INSERT OR REPLACE INTO directories (dir_path, dir_name, parent_path) VALUES (?, ?, ?)",
            params![new_key, new_name, parent.as_deref().map(path_key)],
        )?;

        // Descendant paths all begin with `old_prefix`, so replacing the first
        // `length(old_key)` characters swaps in the new location.
        directories += tx.execute(
            "UPDATE OR REPLACE directories
             SET dir_path = ?1 || substr(dir_path, length(?2) + 1),
                 parent_path = ?1 || substr(parent_path, length(?2) + 1)
             WHERE substr(dir_path, 1, length(?3)) = ?3",
            params![new_key, old_key, old_prefix],
        )?;

        let notes = tx.execute(
            "UPDATE notes
             SET note_dir = ?1 || substr(note_dir, length(?2) + 1), updated_at = ?4
             WHERE note_dir = ?2 OR substr(note_dir, 1, length(?3)) = ?3",
            params![new_key, old_key, old_prefix, now_millis()],
        )?;

        tx.commit()?;

        log::debug!("Renamed subtree {} -> {}", old_key, new_key);
        Ok(SubtreeStats { notes, directories })
    }

    fn clear(&self) -> IndexResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("DELETE FROM notes; DELETE FROM directories;")?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::contract;

    #[test]
    fn test_upsert_and_lookup() {
        contract::upsert_and_lookup(&SqliteIndex::in_memory().unwrap());
    }

    #[test]
    fn test_insert_reports_duplicates() {
        contract::insert_reports_duplicates(&SqliteIndex::in_memory().unwrap());
    }

    #[test]
    fn test_subtree_delete_is_prefix_safe() {
        contract::subtree_delete_is_prefix_safe(&SqliteIndex::in_memory().unwrap());
    }

    #[test]
    fn test_subtree_rename_is_prefix_safe() {
        contract::subtree_rename_is_prefix_safe(&SqliteIndex::in_memory().unwrap());
    }

    #[test]
    fn test_contents_lists_immediate_children() {
        contract::contents_lists_immediate_children(&SqliteIndex::in_memory().unwrap());
    }

    #[test]
    fn test_clear_removes_everything() {
        contract::clear_removes_everything(&SqliteIndex::in_memory().unwrap());
    }

    #[test]
    fn test_underscore_is_not_a_wildcard() {
        let index = SqliteIndex::in_memory().unwrap();
        index
            .upsert_directory(&DirectoryRecord::new(PathBuf::from("/vault/a_b")))
            .unwrap();
        index
            .upsert_directory(&DirectoryRecord::new(PathBuf::from("/vault/axb")))
            .unwrap();
        index
            .upsert_directory(&DirectoryRecord::new(PathBuf::from("/vault/axb/inner")))
            .unwrap();

        let stats = index.delete_directory_subtree(Path::new("/vault/a_b")).unwrap();
        assert_eq!(stats.directories, 1);
        assert_eq!(index.list_directories().unwrap().len(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.db");
        {
            let index = SqliteIndex::open(&db).unwrap();
            index
                .upsert_note(&NoteRecord {
                    note_id: "n1".to_string(),
                    title: "Kept".to_string(),
                    version: "1.0".to_string(),
                    directory: PathBuf::from("/vault"),
                })
                .unwrap();
        }
        let index = SqliteIndex::open(&db).unwrap();
        assert_eq!(index.get_note("n1").unwrap().unwrap().title, "Kept");
    }
}
