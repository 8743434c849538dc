//! Outbound vault events.
//!
//! This module defines the events the state layer emits when something an
//! external layer (a UI, an IPC bridge) may care about has happened. The core's
//! contract ends when the event is emitted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Events emitted by the state layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VaultEvent {
    /// An open note was replaced with a fresh copy read from disk.
    NoteReloaded {
        /// Id of the reloaded note.
        note_id: String,
        /// Absolute path of the note file.
        path: PathBuf,
    },

    /// A directory or a note that is not open changed on disk;
    /// the navigation tree should be refreshed.
    TreeChanged {
        /// Path that triggered the change.
        path: PathBuf,
    },

    /// A debounced or explicit save reached the disk.
    NoteSaved {
        /// Id of the saved note.
        note_id: String,
        /// Absolute path of the note file.
        path: PathBuf,
        /// Modification time captured after the write.
        mtime: f64,
    },

    /// A reload was discarded because the note had local changes.
    HotSwapAborted {
        /// Id of the note.
        note_id: String,
    },

    /// A save failed; the in-memory edit is kept and still dirty.
    SaveFailed {
        /// Id of the note.
        note_id: String,
        /// Human-readable reason.
        message: String,
    },

    /// An open note was deleted from the vault. Its pending edits were
    /// discarded and the note was closed.
    NoteDeleted {
        /// Id of the note.
        note_id: String,
        /// Last known path of the note file.
        path: PathBuf,
    },
}

impl VaultEvent {
    /// Create a NoteReloaded event.
    pub fn note_reloaded(note_id: impl Into<String>, path: PathBuf) -> Self {
        Self::NoteReloaded {
            note_id: note_id.into(),
            path,
        }
    }

    /// Create a TreeChanged event.
    pub fn tree_changed(path: PathBuf) -> Self {
        Self::TreeChanged { path }
    }

    /// Create a NoteSaved event.
    pub fn note_saved(note_id: impl Into<String>, path: PathBuf, mtime: f64) -> Self {
        Self::NoteSaved {
            note_id: note_id.into(),
            path,
            mtime,
        }
    }

    /// Create a HotSwapAborted event.
    pub fn hot_swap_aborted(note_id: impl Into<String>) -> Self {
        Self::HotSwapAborted {
            note_id: note_id.into(),
        }
    }

    /// Create a SaveFailed event.
    pub fn save_failed(note_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SaveFailed {
            note_id: note_id.into(),
            message: message.into(),
        }
    }

    /// Create a NoteDeleted event.
    pub fn note_deleted(note_id: impl Into<String>, path: PathBuf) -> Self {
        Self::NoteDeleted {
            note_id: note_id.into(),
            path,
        }
    }

    /// Get the path associated with this event, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::NoteReloaded { path, .. } => Some(path),
            Self::TreeChanged { path } => Some(path),
            Self::NoteSaved { path, .. } => Some(path),
            Self::NoteDeleted { path, .. } => Some(path),
            Self::HotSwapAborted { .. } => None,
            Self::SaveFailed { .. } => None,
        }
    }

    /// Get the note id associated with this event, if any.
    pub fn note_id(&self) -> Option<&str> {
        match self {
            Self::NoteReloaded { note_id, .. }
            | Self::NoteSaved { note_id, .. }
            | Self::HotSwapAborted { note_id }
            | Self::SaveFailed { note_id, .. }
            | Self::NoteDeleted { note_id, .. } => Some(note_id),
            Self::TreeChanged { .. } => None,
        }
    }

    /// Get the event type as a string.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NoteReloaded { .. } => "NoteReloaded",
            Self::TreeChanged { .. } => "TreeChanged",
            Self::NoteSaved { .. } => "NoteSaved",
            Self::HotSwapAborted { .. } => "HotSwapAborted",
            Self::SaveFailed { .. } => "SaveFailed",
            Self::NoteDeleted { .. } => "NoteDeleted",
        }
    }
}
