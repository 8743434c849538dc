//! Command pattern API for the vault.
//!
//! Every operation an outside layer (a UI bridge, the CLI) can perform is a
//! [`Command`] variant, and every result is a [`Response`]. Both serialize to
//! tagged JSON so they can cross a process boundary unchanged.
//!
//! # Usage
//!
//! ```ignore
//! use jnote_core::command::{Command, Response};
//!
//! let cmd = Command::OpenNote { note_id: "abc".to_string() };
//! let response = service.execute(cmd)?;
//!
//! if let Response::Note(note) = response {
//!     println!("{} blocks", note.document.blocks.len());
//! }
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::blocks::BlockParams;
use crate::document::{Block, DEFAULT_TITLE, NoteDocument};
use crate::error::{Result, SerializableError};
use crate::index::{DirectoryListing, DirectoryRecord, NoteRecord, SubtreeStats};
use crate::vault::CreatedNote;
use crate::watcher::ScanStats;

// ============================================================================
// Command Types
// ============================================================================

/// All commands that can be executed against a running vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Command {
    // === Open Note Operations ===
    /// Open a note (or return the already open instance).
    OpenNote {
        /// Note id.
        note_id: String,
    },

    /// Get the current state of an open note.
    GetNote {
        /// Note id.
        note_id: String,
    },

    /// Close a note, saving pending edits.
    CloseNote {
        /// Note id.
        note_id: String,
    },

    /// Save pending edits of an open note now.
    SaveNote {
        /// Note id.
        note_id: String,
    },

    /// Reload an open note from disk, unless it has local edits.
    ReloadNote {
        /// Note id.
        note_id: String,
    },

    /// Ids of all open notes.
    ListOpenNotes,

    // === Block Operations ===
    /// Add a block to an open note.
    AddBlock {
        /// Note id.
        note_id: String,
        /// Block type tag (e.g. `text`, `todo`).
        block_type: String,
        /// Type-specific parameters.
        #[serde(default)]
        params: BlockParams,
        /// Insert after this block instead of at the end.
        #[serde(default)]
        after_block_id: Option<String>,
    },

    /// Replace the payload of a block.
    UpdateBlock {
        /// Note id.
        note_id: String,
        /// Block id.
        block_id: String,
        /// New payload.
        data: JsonValue,
    },

    /// Remove a block.
    DeleteBlock {
        /// Note id.
        note_id: String,
        /// Block id.
        block_id: String,
    },

    /// Registered block type tags.
    ListBlockTypes,

    // === Vault Operations ===
    /// Create an empty note in a directory.
    CreateNote {
        /// Directory to create the note in.
        directory: PathBuf,
        /// Title of the new note.
        #[serde(default = "default_title")]
        title: String,
    },

    /// Delete a note file (closing it first if open).
    DeleteNote {
        /// Note id.
        note_id: String,
    },

    /// Create a directory.
    CreateDirectory {
        /// Parent directory.
        parent: PathBuf,
        /// New directory name.
        name: String,
    },

    /// Rename a directory in place.
    RenameDirectory {
        /// Directory to rename.
        path: PathBuf,
        /// New name.
        new_name: String,
    },

    /// Delete a directory and everything in it.
    DeleteDirectory {
        /// Directory to delete.
        path: PathBuf,
    },

    // === Index Queries ===
    /// All indexed notes.
    ListNotes,

    /// All indexed directories.
    ListDirectories,

    /// A single directory record.
    GetDirectory {
        /// Directory path.
        path: PathBuf,
    },

    /// Immediate children of a directory (the vault root when omitted).
    GetDirectoryContents {
        /// Directory path.
        #[serde(default)]
        path: Option<PathBuf>,
    },

    /// Clear the index and rebuild it from disk.
    RescanVault,

    /// Read and clear the navigation-tree refresh flag.
    TakeTreeRefresh,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

// ============================================================================
// Response Types
// ============================================================================

/// State of an open note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteView {
    /// Note id.
    pub note_id: String,
    /// File path.
    pub path: PathBuf,
    /// Document snapshot.
    pub document: NoteDocument,
    /// Whether there are unsaved edits.
    pub dirty: bool,
    /// Whether the note stands in for an unreadable file.
    pub placeholder: bool,
}

/// Responses from command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Response {
    /// Command completed successfully with no data.
    Ok,

    /// Boolean response.
    Bool(bool),

    /// Path response.
    Path(PathBuf),

    /// List of strings response.
    Strings(Vec<String>),

    /// Open note response.
    Note(NoteView),

    /// Single block response.
    Block(Block),

    /// Newly created note.
    CreatedNote(CreatedNote),

    /// Note records.
    Notes(Vec<NoteRecord>),

    /// Directory records.
    Directories(Vec<DirectoryRecord>),

    /// Optional directory record.
    Directory(Option<DirectoryRecord>),

    /// Directory listing.
    Listing(DirectoryListing),

    /// Records removed by a recursive delete.
    Removed(SubtreeStats),

    /// Scan summary.
    Scan(ScanStats),
}

/// Envelope for returning a command result across an IPC boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Whether the command succeeded.
    pub success: bool,
    /// Human-readable summary; the error message on failure.
    pub message: String,
    /// The serialized [`Response`] on success, or a serialized error on failure.
    #[serde(default)]
    pub data: Option<JsonValue>,
}

impl OperationResponse {
    /// Wrap the result of [`execute`](crate::command_handler::CommandHandler::execute).
    pub fn from_result(result: Result<Response>) -> Self {
        match result {
            Ok(response) => Self {
                success: true,
                message: "ok".to_string(),
                data: serde_json::to_value(&response).ok(),
            },
            Err(e) => {
                let error = SerializableError::from(&e);
                Self {
                    success: false,
                    message: error.message.clone(),
                    data: serde_json::to_value(&error).ok(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JnoteError;
    use serde_json::json;

    #[test]
    fn test_command_serialization() {
        let cmd = Command::OpenNote {
            note_id: "abc".to_string(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("OpenNote"));
        assert!(json.contains("abc"));

        let cmd2: Command = serde_json::from_str(&json).unwrap();
        if let Command::OpenNote { note_id } = cmd2 {
            assert_eq!(note_id, "abc");
        } else {
            panic!("Wrong command type");
        }
    }

    #[test]
    fn test_add_block_defaults() {
        let cmd: Command = serde_json::from_value(json!({
            "type": "AddBlock",
            "params": {"note_id": "n", "block_type": "todo"}
        }))
        .unwrap();
        match cmd {
            Command::AddBlock {
                params,
                after_block_id,
                ..
            } => {
                assert!(params.is_empty());
                assert!(after_block_id.is_none());
            }
            other => panic!("Wrong command type: {other:?}"),
        }
    }

    #[test]
    fn test_create_note_default_title() {
        let cmd: Command = serde_json::from_value(json!({
            "type": "CreateNote",
            "params": {"directory": "/vault"}
        }))
        .unwrap();
        match cmd {
            Command::CreateNote { title, .. } => assert_eq!(title, DEFAULT_TITLE),
            other => panic!("Wrong command type: {other:?}"),
        }
    }

    #[test]
    fn test_unit_command_serialization() {
        let json = serde_json::to_value(Command::ListOpenNotes).unwrap();
        assert_eq!(json, json!({"type": "ListOpenNotes"}));
    }

    #[test]
    fn test_operation_response_success() {
        let op = OperationResponse::from_result(Ok(Response::Bool(true)));
        assert!(op.success);
        assert_eq!(op.data, Some(json!({"type": "Bool", "data": true})));
    }

    #[test]
    fn test_operation_response_failure() {
        let op = OperationResponse::from_result(Err(JnoteError::NotIndexed("x".to_string())));
        assert!(!op.success);
        assert!(op.message.contains("not in the index"));
        assert_eq!(op.data.unwrap()["kind"], json!("NotIndexed"));
    }
}
