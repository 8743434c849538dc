//! Path utilities for separator-bounded prefix matching.
//!
//! The index stores paths as strings, and recursive operations (subtree delete,
//! subtree rename) select descendants by prefix. A bare string prefix would
//! make `/vault/Project` match `/vault/ProjectBackup`, so every prefix used
//! for descendant matching ends in a path separator.

use std::path::{MAIN_SEPARATOR, Path};

/// Convert a path to the string form stored in the index.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Prefix that matches only strict descendants of `dir`.
///
/// # Example
/// ```
/// use jnote_core::path_utils::child_prefix;
///
/// let prefix = child_prefix("/vault/Project");
/// assert!(!"/vault/ProjectBackup".starts_with(&prefix));
/// assert!("/vault/Project/notes".starts_with(&prefix));
/// ```
pub fn child_prefix(dir: &str) -> String {
    if dir.ends_with(MAIN_SEPARATOR) || dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}{MAIN_SEPARATOR}")
    }
}

/// Whether `path` is `dir` itself or lies somewhere beneath it.
pub fn is_within(path: &str, dir: &str) -> bool {
    path == dir || path.starts_with(&child_prefix(dir))
}

/// Rewrite `path` from under `old_dir` to the same relative location under `new_dir`.
///
/// Returns `None` when `path` is not `old_dir` or one of its descendants.
pub fn rewrite_prefix(path: &str, old_dir: &str, new_dir: &str) -> Option<String> {
    if path == old_dir {
        return Some(new_dir.to_string());
    }
    let prefix = child_prefix(old_dir);
    path.strip_prefix(&prefix)
        .map(|rest| format!("{}{}", child_prefix(new_dir), rest))
}
