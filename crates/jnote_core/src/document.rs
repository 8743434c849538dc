//! The `.jnote` note document.
//!
//! A note file is a JSON object with three top-level keys:
//!
//! ```text
//! {
//!     "metadata":      { note_id, title, created_at, last_modified, version, status, tags },
//!     "custom_fields": { ...free-form... },
//!     "blocks":        [ { block_id, type, data, version, tags, backlinks }, ... ]
//! }
//! ```
//!
//! Block payloads (`data`) are opaque to the core. The only structural
//! requirement is the `metadata` object; a file without it is corrupt.
//!
//! [`read_header`] extracts just `metadata` from a stream. Keys before it are
//! skipped token by token without being materialized, and parsing stops as
//! soon as `metadata` is read, so indexing a vault neither allocates block
//! payloads nor reads past the header when it comes first.

use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::Utc;
use indexmap::IndexMap;
use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{JnoteError, Result};
use crate::fs::FileSystem;

/// Current on-disk version tag for notes.
pub const CURRENT_NOTE_VERSION: &str = "1.0";

/// Current on-disk version tag for blocks.
pub const CURRENT_BLOCK_VERSION: &str = "1.0";

/// Title given to new notes when none is supplied.
pub const DEFAULT_TITLE: &str = "Untitled Note";

/// Title of the placeholder used when a note cannot be read.
pub const PLACEHOLDER_TITLE: &str = "Error Loading Note";

/// Current time in the document timestamp format.
pub fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Note id derived from a file name (`<id>.jnote`).
pub fn note_id_from_path(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_block_type() -> String {
    "text".to_string()
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_note_version() -> String {
    CURRENT_NOTE_VERSION.to_string()
}

fn default_block_version() -> String {
    CURRENT_BLOCK_VERSION.to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

/// Version tags are strings, but older files carry bare numbers.
fn version_tag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tag {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Tag::deserialize(deserializer)? {
        Tag::Text(s) => s,
        Tag::Int(i) => i.to_string(),
        Tag::Float(f) => f.to_string(),
    })
}

/// A single content unit of a note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Unique id of the block
    #[serde(default = "new_id")]
    pub block_id: String,
    /// Type tag (text, todo, code, ...)
    #[serde(rename = "type", default = "default_block_type")]
    pub block_type: String,
    /// Type-specific payload
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Block format version
    #[serde(default = "default_block_version", deserialize_with = "version_tag")]
    pub version: String,
    /// Tags attached to the block
    #[serde(default)]
    pub tags: Vec<String>,
    /// Ids of blocks or notes linking here
    #[serde(default)]
    pub backlinks: Vec<String>,
}

impl Block {
    /// Create a block with a fresh id.
    pub fn new(block_type: impl Into<String>, data: Value) -> Self {
        Self {
            block_id: new_id(),
            block_type: block_type.into(),
            data,
            version: default_block_version(),
            tags: Vec::new(),
            backlinks: Vec::new(),
        }
    }
}

/// Header section of a note document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteHeader {
    /// Stable note id. Empty when missing from the file; loaders fill it from the file name.
    #[serde(default)]
    pub note_id: String,
    /// Display title
    #[serde(default = "default_title")]
    pub title: String,
    /// ISO-8601 creation time
    #[serde(default = "now_timestamp")]
    pub created_at: String,
    /// ISO-8601 last modification time
    #[serde(default = "now_timestamp")]
    pub last_modified: String,
    /// Note format version
    #[serde(default = "default_note_version", deserialize_with = "version_tag")]
    pub version: String,
    /// Status code (0 = active, 1 = archived)
    #[serde(default)]
    pub status: i64,
    /// Note-level tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NoteHeader {
    /// Stamp the header with the current time.
    pub fn touch(&mut self) {
        self.last_modified = now_timestamp();
    }
}

/// A complete note: header, free-form custom fields and ordered blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDocument {
    /// Header section
    pub metadata: NoteHeader,
    /// Free-form fields preserved verbatim
    #[serde(default)]
    pub custom_fields: IndexMap<String, Value>,
    /// Ordered content blocks
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl NoteDocument {
    /// Create a fresh, empty note with a new id and current timestamps.
    pub fn create_new(title: impl Into<String>) -> Self {
        let now = now_timestamp();
        Self {
            metadata: NoteHeader {
                note_id: new_id(),
                title: title.into(),
                created_at: now.clone(),
                last_modified: now,
                version: default_note_version(),
                status: 0,
                tags: Vec::new(),
            },
            custom_fields: IndexMap::new(),
            blocks: Vec::new(),
        }
    }

    /// Empty document standing in for a note that could not be read.
    pub fn placeholder(note_id: impl Into<String>) -> Self {
        let mut doc = Self::create_new(PLACEHOLDER_TITLE);
        doc.metadata.note_id = note_id.into();
        doc
    }

    /// Note id
    pub fn id(&self) -> &str {
        &self.metadata.note_id
    }

    /// Parse a document from JSON text.
    ///
    /// `path` is used for the error and to fill in a missing note id.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let mut doc: NoteDocument =
            serde_json::from_str(content).map_err(|e| JnoteError::CorruptDocument {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if doc.metadata.note_id.is_empty()
            && let Some(id) = note_id_from_path(path)
        {
            doc.metadata.note_id = id;
        }
        Ok(doc)
    }

    /// Serialize to the on-disk JSON form (four-space indentation).
    pub fn to_json_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        // serde_json only ever emits UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Find a block by id.
    pub fn block(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.block_id == block_id)
    }

    /// Append a block at the end.
    pub fn append_block(&mut self, block: Block) {
        self.blocks.push(block);
    }

    /// Insert a block right after `after_id`, or append when that block doesn't exist.
    ///
    /// Returns `true` if the anchor block was found.
    pub fn insert_block_after(&mut self, after_id: &str, block: Block) -> bool {
        match self.blocks.iter().position(|b| b.block_id == after_id) {
            Some(index) => {
                self.blocks.insert(index + 1, block);
                true
            }
            None => {
                self.blocks.push(block);
                false
            }
        }
    }

    /// Replace the payload of a block. Returns `false` if no such block exists.
    pub fn replace_block_data(&mut self, block_id: &str, data: Value) -> bool {
        match self.blocks.iter_mut().find(|b| b.block_id == block_id) {
            Some(block) => {
                block.data = data;
                true
            }
            None => false,
        }
    }

    /// Remove a block. Returns `false` if no such block exists.
    pub fn remove_block(&mut self, block_id: &str) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| b.block_id != block_id);
        self.blocks.len() < before
    }
}

/// Fills `slot` with the `metadata` object, then aborts the parse.
struct HeaderVisitor<'a> {
    slot: &'a mut Option<NoteHeader>,
}

impl<'de> Visitor<'de> for HeaderVisitor<'_> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a note document object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        while let Some(key) = map.next_key::<String>()? {
            if key == "metadata" {
                *self.slot = Some(map.next_value()?);
                // Returning an error is the only way to leave the object early.
                return Err(de::Error::custom("header read"));
            }
            map.next_value::<IgnoredAny>()?;
        }
        Err(de::Error::missing_field("metadata"))
    }
}

/// Read only the `metadata` object from a note stream.
///
/// Top-level keys before it are skipped without allocating their contents.
/// Nothing after it is parsed, so a file damaged past its header still
/// yields the header.
pub fn read_header<R: Read>(reader: R, path: &Path) -> Result<NoteHeader> {
    let mut slot = None;
    let mut de = serde_json::Deserializer::from_reader(reader);
    let parsed = (&mut de).deserialize_map(HeaderVisitor { slot: &mut slot });
    let mut metadata = match (slot, parsed) {
        (Some(metadata), _) => metadata,
        (None, Err(e)) => {
            return Err(JnoteError::CorruptDocument {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
        (None, Ok(())) => {
            return Err(JnoteError::CorruptDocument {
                path: path.to_path_buf(),
                reason: "missing field `metadata`".to_string(),
            });
        }
    };
    if metadata.note_id.is_empty()
        && let Some(id) = note_id_from_path(path)
    {
        metadata.note_id = id;
    }
    Ok(metadata)
}

/// Extract the header of a note file through a filesystem.
pub fn extract_header<FS: FileSystem + ?Sized>(fs: &FS, path: &Path) -> Result<NoteHeader> {
    let reader = fs.open_reader(path).map_err(|e| JnoteError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_header(reader, path)
}

/// Load a full document from disk.
///
/// A missing file is [`JnoteError::NotFoundOnDisk`]; unparseable content is
/// [`JnoteError::CorruptDocument`].
pub fn load_document<FS: FileSystem + ?Sized>(fs: &FS, path: &Path) -> Result<NoteDocument> {
    let content = fs.read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            JnoteError::NotFoundOnDisk(path.to_path_buf())
        } else {
            JnoteError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;
    NoteDocument::parse(&content, path)
}

/// Write a document to disk and return the file's resulting modification time.
pub fn save_document<FS: FileSystem + ?Sized>(
    fs: &FS,
    path: &Path,
    doc: &NoteDocument,
) -> Result<f64> {
    let content = doc.to_json_string()?;
    fs.write_file(path, &content)
        .map_err(|e| JnoteError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    Ok(fs
        .get_modified_time(path)
        .unwrap_or_else(crate::now_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn sample() -> String {
        json!({
            "metadata": {
                "note_id": "n-1",
                "title": "Groceries",
                "created_at": "2024-01-01T00:00:00.000000Z",
                "last_modified": "2024-01-02T00:00:00.000000Z",
                "version": "1.0",
                "status": 0,
                "tags": ["home"]
            },
            "custom_fields": {"color": "green", "pinned": true},
            "blocks": [
                {"block_id": "b1", "type": "text", "data": {"content": "milk", "format": "markdown"},
                 "version": "1.0", "tags": [], "backlinks": []},
                {"block_id": "b2", "type": "todo", "data": {"content": "eggs", "checked": false}}
            ]
        })
        .to_string()
    }

    #[test]
    fn test_parse_full_document() {
        let doc = NoteDocument::parse(&sample(), Path::new("/v/n-1.jnote")).unwrap();
        assert_eq!(doc.id(), "n-1");
        assert_eq!(doc.metadata.title, "Groceries");
        assert_eq!(doc.metadata.tags, vec!["home"]);
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.blocks[1].version, CURRENT_BLOCK_VERSION);
        assert_eq!(doc.custom_fields.get("pinned"), Some(&json!(true)));
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let path = Path::new("/v/n-1.jnote");
        let doc = NoteDocument::parse(&sample(), path).unwrap();
        let written = doc.to_json_string().unwrap();
        let reparsed = NoteDocument::parse(&written, path).unwrap();
        assert_eq!(doc, reparsed);
        // custom field order survives
        let keys: Vec<_> = reparsed.custom_fields.keys().cloned().collect();
        assert_eq!(keys, vec!["color", "pinned"]);
    }

    #[test]
    fn test_missing_metadata_is_corrupt() {
        let err = NoteDocument::parse(r#"{"blocks": []}"#, Path::new("/v/x.jnote")).unwrap_err();
        assert!(matches!(err, JnoteError::CorruptDocument { .. }));
    }

    #[test]
    fn test_numeric_version_is_accepted() {
        let content = r#"{"metadata": {"note_id": "a", "version": 2}, "blocks": []}"#;
        let doc = NoteDocument::parse(content, Path::new("/v/a.jnote")).unwrap();
        assert_eq!(doc.metadata.version, "2");
    }

    #[test]
    fn test_missing_note_id_falls_back_to_file_stem() {
        let content = r#"{"metadata": {"title": "Loose"}}"#;
        let doc = NoteDocument::parse(content, Path::new("/v/stem-id.jnote")).unwrap();
        assert_eq!(doc.id(), "stem-id");
        assert!(doc.blocks.is_empty());
    }

    #[test]
    fn test_read_header_skips_blocks() {
        let header = read_header(sample().as_bytes(), Path::new("/v/n-1.jnote")).unwrap();
        assert_eq!(header.note_id, "n-1");
        assert_eq!(header.title, "Groceries");
    }

    #[test]
    fn test_read_header_with_metadata_last() {
        let content = r#"{"blocks": [{"block_id": "x", "data": {"big": [1,2,3]}}], "metadata": {"note_id": "late"}}"#;
        let header = read_header(content.as_bytes(), Path::new("/v/late.jnote")).unwrap();
        assert_eq!(header.note_id, "late");
        assert_eq!(header.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_read_header_stops_after_metadata() {
        let content = r#"{"metadata": {"note_id": "early", "title": "Kept"}, "blocks": [{"block_id": "tr"#;
        let header = read_header(content.as_bytes(), Path::new("/v/early.jnote")).unwrap();
        assert_eq!(header.note_id, "early");
        assert_eq!(header.title, "Kept");
    }

    #[test]
    fn test_read_header_without_metadata_is_corrupt() {
        let err = read_header(r#"{"blocks": []}"#.as_bytes(), Path::new("/v/b.jnote")).unwrap_err();
        assert!(matches!(err, JnoteError::CorruptDocument { .. }));
    }

    #[test]
    fn test_read_header_rejects_garbage() {
        let err = read_header("not json".as_bytes(), Path::new("/v/g.jnote")).unwrap_err();
        assert!(matches!(err, JnoteError::CorruptDocument { .. }));
    }

    #[test]
    fn test_block_operations() {
        let mut doc = NoteDocument::create_new("Ops");
        let a = Block::new("text", json!({"content": "a"}));
        let b = Block::new("text", json!({"content": "b"}));
        let c = Block::new("text", json!({"content": "c"}));
        let (a_id, b_id, c_id) = (a.block_id.clone(), b.block_id.clone(), c.block_id.clone());

        doc.append_block(a);
        doc.append_block(b);
        assert!(doc.insert_block_after(&a_id, c));
        let order: Vec<_> = doc.blocks.iter().map(|b| b.block_id.clone()).collect();
        assert_eq!(order, vec![a_id.clone(), c_id.clone(), b_id.clone()]);

        assert!(doc.replace_block_data(&c_id, json!({"content": "C"})));
        assert_eq!(doc.block(&c_id).unwrap().data, json!({"content": "C"}));
        assert!(!doc.replace_block_data("missing", json!({})));

        assert!(doc.remove_block(&a_id));
        assert!(!doc.remove_block(&a_id));
        assert_eq!(doc.blocks.len(), 2);
    }

    #[test]
    fn test_insert_after_unknown_anchor_appends() {
        let mut doc = NoteDocument::create_new("Ops");
        doc.append_block(Block::new("text", json!({})));
        let tail = Block::new("code", json!({}));
        let tail_id = tail.block_id.clone();
        assert!(!doc.insert_block_after("nope", tail));
        assert_eq!(doc.blocks.last().unwrap().block_id, tail_id);
    }

    #[test]
    fn test_placeholder_keeps_requested_id() {
        let doc = NoteDocument::placeholder("wanted");
        assert_eq!(doc.id(), "wanted");
        assert_eq!(doc.metadata.title, PLACEHOLDER_TITLE);
    }

    #[test]
    fn test_load_missing_file_is_not_found_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.jnote");
        let err = load_document(&crate::fs::RealFileSystem, &path).unwrap_err();
        assert!(matches!(err, JnoteError::NotFoundOnDisk(p) if p == PathBuf::from(&path)));
    }
}
