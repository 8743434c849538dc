//! Vault command handlers

use serde_json::Value;
use std::path::Path;

use jnote_core::blocks::BlockParams;
use jnote_core::command::{Command, Response};
use jnote_core::document::DEFAULT_TITLE;
use jnote_core::error::Result;
use jnote_core::index::{DirectoryListing, IndexStore};
use jnote_core::service::VaultService;

use crate::cli::{ServiceOptions, finish};

/// Rebuild the index from disk and report what was found.
pub fn handle_scan(options: &ServiceOptions, vault: &Path) -> bool {
    let Some(service) = options.start(vault, false) else {
        return false;
    };
    match service.execute(Command::RescanVault) {
        Ok(Response::Scan(stats)) => {
            println!(
                "✓ Indexed {} notes in {} directories",
                stats.notes, stats.directories
            );
            finish(service)
        }
        Ok(other) => {
            eprintln!("✗ Unexpected response: {:?}", other);
            false
        }
        Err(e) => {
            eprintln!("✗ Scan failed: {}", e);
            false
        }
    }
}

/// Print every indexed note.
pub fn handle_list(options: &ServiceOptions, vault: &Path) -> bool {
    let Some(service) = options.start(vault, false) else {
        return false;
    };
    match service.index().list_notes() {
        Ok(notes) => {
            let root = service.root();
            for note in notes {
                let dir = note.directory.strip_prefix(root).unwrap_or(&note.directory);
                println!("{}\t{}\t{}", note.note_id, note.title, dir.display());
            }
            finish(service)
        }
        Err(e) => {
            eprintln!("✗ Could not list notes: {}", e);
            false
        }
    }
}

/// Print the folder tree below `dir` (the vault root by default).
pub fn handle_tree(options: &ServiceOptions, vault: &Path, dir: Option<&Path>) -> bool {
    let Some(service) = options.start(vault, false) else {
        return false;
    };
    let start = match dir {
        Some(dir) => service.root().join(dir),
        None => service.root().to_path_buf(),
    };

    let mut lines = Vec::new();
    match render_tree(&**service.index(), &start, 0, &mut lines) {
        Ok(()) => {
            println!("{}", start.display());
            for line in lines {
                println!("{}", line);
            }
            finish(service)
        }
        Err(e) => {
            eprintln!("✗ Could not read tree: {}", e);
            false
        }
    }
}

fn render_tree(
    index: &dyn IndexStore,
    dir: &Path,
    depth: usize,
    lines: &mut Vec<String>,
) -> Result<()> {
    let DirectoryListing { folders, notes, .. } = index.directory_contents(dir)?;
    let indent = "  ".repeat(depth + 1);
    for folder in folders {
        lines.push(format!("{}{}/", indent, folder.name));
        render_tree(index, &folder.path, depth + 1, lines)?;
    }
    for note in notes {
        lines.push(format!("{}{} ({})", indent, note.title, note.note_id));
    }
    Ok(())
}

/// Create an empty note.
pub fn handle_new(
    options: &ServiceOptions,
    vault: &Path,
    dir: Option<&Path>,
    title: Option<String>,
) -> bool {
    let Some(service) = options.start(vault, false) else {
        return false;
    };
    let directory = match dir {
        Some(dir) => service.root().join(dir),
        None => service.root().to_path_buf(),
    };
    let cmd = Command::CreateNote {
        directory,
        title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
    };
    match service.execute(cmd) {
        Ok(Response::CreatedNote(created)) => {
            println!("✓ Created note {}", created.note_id);
            println!("  {}", created.path.display());
            finish(service)
        }
        Ok(other) => {
            eprintln!("✗ Unexpected response: {:?}", other);
            false
        }
        Err(e) => {
            eprintln!("✗ Could not create note: {}", e);
            false
        }
    }
}

/// Open a note, add one block and close it again (which saves it).
pub fn handle_add_block(
    options: &ServiceOptions,
    vault: &Path,
    note_id: String,
    block_type: String,
    params: Vec<(String, Value)>,
    after: Option<String>,
) -> bool {
    let Some(service) = options.start(vault, false) else {
        return false;
    };
    match add_block(&service, note_id, block_type, params.into_iter().collect(), after) {
        Ok(block_id) => {
            println!("✓ Added block {}", block_id);
            finish(service)
        }
        Err(e) => {
            eprintln!("✗ Could not add block: {}", e);
            false
        }
    }
}

fn add_block(
    service: &VaultService,
    note_id: String,
    block_type: String,
    params: BlockParams,
    after_block_id: Option<String>,
) -> Result<String> {
    let note = service.state().open(&note_id)?;
    let block = note.add_block(&block_type, &params, after_block_id.as_deref())?;
    service.state().close(&note_id)?;
    Ok(block.block_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jnote_core::config::Config;
    use jnote_core::document::load_document;
    use jnote_core::fs::RealFileSystem;
    use serde_json::json;

    fn service(root: &Path) -> VaultService {
        let mut config = Config::new(root.to_path_buf());
        config.watch = false;
        VaultService::start(config).unwrap()
    }

    #[test]
    fn test_add_block_saves_note() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let created = service.vault().create_note(service.root(), "Groceries").unwrap();

        let params = vec![("content".to_string(), json!("milk"))];
        let block_id = add_block(
            &service,
            created.note_id.clone(),
            "todo".to_string(),
            params.into_iter().collect(),
            None,
        )
        .unwrap();

        assert!(!service.state().is_open(&created.note_id));
        let doc = load_document(&RealFileSystem, &created.path).unwrap();
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.blocks[0].block_id, block_id);
        assert_eq!(doc.blocks[0].data["content"], json!("milk"));
        assert_eq!(doc.blocks[0].data["checked"], json!(false));
    }

    #[test]
    fn test_render_tree_nests_folders() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let root = service.root().to_path_buf();
        let work = service.vault().create_directory(&root, "Work").unwrap();
        service.vault().create_note(&work, "Plan").unwrap();
        service.vault().create_note(&root, "Inbox").unwrap();

        let mut lines = Vec::new();
        render_tree(&**service.index(), &root, 0, &mut lines).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "  Work/");
        assert!(lines[1].starts_with("    Plan ("));
        assert!(lines[2].starts_with("  Inbox ("));
    }
}
