use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Unified error type for jnote operations
#[derive(Debug, Error)]
pub enum JnoteError {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Index errors
    #[error("Index database error: {0}")]
    Database(#[from] rusqlite::Error),

    // Watcher errors
    #[error("Filesystem watcher error: {0}")]
    Watcher(#[from] notify::Error),

    // Config errors
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    // Note errors
    #[error("Note '{0}' is not in the index")]
    NotIndexed(String),

    #[error("Note file '{0}' is indexed but missing on disk")]
    NotFoundOnDisk(PathBuf),

    #[error("Note file '{path}' is corrupt: {reason}")]
    CorruptDocument { path: PathBuf, reason: String },

    #[error("Failed to save note to '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Reload of note '{0}' aborted: it has local changes")]
    HotSwapAborted(String),

    #[error("Block '{block_id}' not found in note '{note_id}'")]
    BlockNotFound { note_id: String, block_id: String },

    #[error("Note '{0}' is not open")]
    NoteNotOpen(String),

    // Vault errors
    #[error("Directory not found: '{0}'")]
    DirectoryNotFound(PathBuf),

    #[error("Path already exists: '{0}'")]
    AlreadyExists(PathBuf),

    #[error("Invalid name: '{0}'")]
    InvalidName(String),
}

/// Result type alias for jnote operations
pub type Result<T> = std::result::Result<T, JnoteError>;

/// A serializable representation of JnoteError for IPC
#[derive(Debug, Clone, Serialize)]
pub struct SerializableError {
    /// Error kind/variant name
    pub kind: String,
    /// Human-readable error message
    pub message: String,
    /// Associated path (if applicable)
    pub path: Option<PathBuf>,
}

impl From<&JnoteError> for SerializableError {
    fn from(err: &JnoteError) -> Self {
        let kind = match err {
            JnoteError::Io(_) => "Io",
            JnoteError::FileRead { .. } => "FileRead",
            JnoteError::FileWrite { .. } => "FileWrite",
            JnoteError::Json(_) => "Json",
            JnoteError::Database(_) => "Database",
            JnoteError::Watcher(_) => "Watcher",
            JnoteError::ConfigParse(_) => "ConfigParse",
            JnoteError::ConfigSerialize(_) => "ConfigSerialize",
            JnoteError::NoConfigDir => "NoConfigDir",
            JnoteError::NotIndexed(_) => "NotIndexed",
            JnoteError::NotFoundOnDisk(_) => "NotFoundOnDisk",
            JnoteError::CorruptDocument { .. } => "CorruptDocument",
            JnoteError::WriteFailed { .. } => "WriteFailed",
            JnoteError::HotSwapAborted(_) => "HotSwapAborted",
            JnoteError::BlockNotFound { .. } => "BlockNotFound",
            JnoteError::NoteNotOpen(_) => "NoteNotOpen",
            JnoteError::DirectoryNotFound(_) => "DirectoryNotFound",
            JnoteError::AlreadyExists(_) => "AlreadyExists",
            JnoteError::InvalidName(_) => "InvalidName",
        }
        .to_string();

        let path = match err {
            JnoteError::FileRead { path, .. } => Some(path.clone()),
            JnoteError::FileWrite { path, .. } => Some(path.clone()),
            JnoteError::NotFoundOnDisk(path) => Some(path.clone()),
            JnoteError::CorruptDocument { path, .. } => Some(path.clone()),
            JnoteError::WriteFailed { path, .. } => Some(path.clone()),
            JnoteError::DirectoryNotFound(path) => Some(path.clone()),
            JnoteError::AlreadyExists(path) => Some(path.clone()),
            _ => None,
        };

        Self {
            kind,
            message: err.to_string(),
            path,
        }
    }
}

impl From<JnoteError> for SerializableError {
    fn from(err: JnoteError) -> Self {
        SerializableError::from(&err)
    }
}

impl JnoteError {
    /// Convert to a serializable representation for IPC
    pub fn to_serializable(&self) -> SerializableError {
        SerializableError::from(self)
    }
}
