#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Active note (the editable in-memory copy of one open note)
pub mod active_note;

/// Block-type registry and payload builders
pub mod blocks;

/// Command pattern API
pub mod command;

/// Command execution against a running vault
pub mod command_handler;

/// Configuration options
pub mod config;

/// Debounce timer for deferred saves
pub mod debounce;

/// Note document model and on-disk format
pub mod document;

/// Error (common error types)
pub mod error;

/// Filesystem abstraction and outbound events
pub mod fs;

/// Vault index (note ids and directory tree)
pub mod index;

/// Path utilities for separator-bounded prefix matching
pub mod path_utils;

/// Wires config, index, state and watcher together
pub mod service;

/// Open-note registry and change routing
pub mod state;

/// Disk operations on notes and directories
pub mod vault;

/// Filesystem watcher and initial vault scan
pub mod watcher;

#[cfg(test)]
pub mod test_utils;

/// Current wall-clock time in seconds since the Unix epoch.
pub(crate) fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
