//! Command execution handler.
//!
//! [`CommandHandler::execute`] maps each [`Command`] onto the state manager,
//! the vault or the index and wraps the result in a [`Response`].

use std::sync::Arc;

use crate::active_note::{ActiveNote, HotSwapOutcome};
use crate::command::{Command, NoteView, Response};
use crate::error::{JnoteError, Result};
use crate::index::IndexStore;
use crate::state::StateManager;
use crate::vault::Vault;
use crate::watcher::scan_vault;

/// Executes commands against a running vault.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    state: Arc<StateManager>,
    vault: Vault,
}

fn view(note: &ActiveNote) -> NoteView {
    NoteView {
        note_id: note.id().to_string(),
        path: note.path(),
        document: note.document(),
        dirty: note.is_dirty(),
        placeholder: note.is_placeholder(),
    }
}

impl CommandHandler {
    /// Create a handler over `state` and `vault`.
    pub fn new(state: Arc<StateManager>, vault: Vault) -> Self {
        Self { state, vault }
    }

    fn index(&self) -> &dyn IndexStore {
        &*self.state.context().index
    }

    /// Execute a command and return the response.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let cmd = Command::AddBlock {
    ///     note_id: id.clone(),
    ///     block_type: "text".to_string(),
    ///     params: BlockParams::new(),
    ///     after_block_id: None,
    /// };
    /// if let Response::Block(block) = handler.execute(cmd)? {
    ///     println!("added {}", block.block_id);
    /// }
    /// ```
    pub fn execute(&self, command: Command) -> Result<Response> {
        match command {
            // === Open Note Operations ===
            Command::OpenNote { note_id } => {
                let note = self.state.open(&note_id)?;
                Ok(Response::Note(view(&note)))
            }

            Command::GetNote { note_id } => {
                let note = self.state.require(&note_id)?;
                Ok(Response::Note(view(&note)))
            }

            Command::CloseNote { note_id } => {
                self.state.close(&note_id)?;
                Ok(Response::Ok)
            }

            Command::SaveNote { note_id } => {
                let written = self.state.require(&note_id)?.flush()?;
                Ok(Response::Bool(written))
            }

            Command::ReloadNote { note_id } => {
                let note = self.state.require(&note_id)?;
                let snapshot = note.read_snapshot(note.echo_watermark())?;
                match note.apply_snapshot(snapshot) {
                    HotSwapOutcome::Applied | HotSwapOutcome::Failed => {
                        Ok(Response::Note(view(&note)))
                    }
                    HotSwapOutcome::Aborted => Err(JnoteError::HotSwapAborted(note_id)),
                    HotSwapOutcome::Closed => Err(JnoteError::NoteNotOpen(note_id)),
                }
            }

            Command::ListOpenNotes => Ok(Response::Strings(self.state.open_notes())),

            // === Block Operations ===
            Command::AddBlock {
                note_id,
                block_type,
                params,
                after_block_id,
            } => {
                let note = self.state.require(&note_id)?;
                let block = note.add_block(&block_type, &params, after_block_id.as_deref())?;
                Ok(Response::Block(block))
            }

            Command::UpdateBlock {
                note_id,
                block_id,
                data,
            } => {
                self.state.require(&note_id)?.update_block(&block_id, data)?;
                Ok(Response::Ok)
            }

            Command::DeleteBlock { note_id, block_id } => {
                self.state.require(&note_id)?.delete_block(&block_id)?;
                Ok(Response::Ok)
            }

            Command::ListBlockTypes => Ok(Response::Strings(
                self.state.context().blocks.block_types(),
            )),

            // === Vault Operations ===
            Command::CreateNote { directory, title } => {
                let created = self.vault.create_note(&directory, &title)?;
                Ok(Response::CreatedNote(created))
            }

            Command::DeleteNote { note_id } => {
                if self.state.is_open(&note_id) {
                    self.state.close(&note_id)?;
                }
                self.vault.delete_note(&note_id)?;
                Ok(Response::Ok)
            }

            Command::CreateDirectory { parent, name } => {
                let path = self.vault.create_directory(&parent, &name)?;
                Ok(Response::Path(path))
            }

            Command::RenameDirectory { path, new_name } => {
                let new_path = self.vault.rename_directory(&path, &new_name)?;
                let moved = self.state.refresh_paths();
                if moved > 0 {
                    log::info!("Re-pointed {} open notes to {}", moved, new_path.display());
                }
                Ok(Response::Path(new_path))
            }

            Command::DeleteDirectory { path } => {
                let stats = self.vault.delete_directory(&path)?;
                for note_id in self.state.close_within(&path) {
                    log::warn!("Closed note {} with its deleted directory", note_id);
                }
                Ok(Response::Removed(stats))
            }

            // === Index Queries ===
            Command::ListNotes => Ok(Response::Notes(self.index().list_notes()?)),

            Command::ListDirectories => {
                Ok(Response::Directories(self.index().list_directories()?))
            }

            Command::GetDirectory { path } => {
                Ok(Response::Directory(self.index().get_directory(&path)?))
            }

            Command::GetDirectoryContents { path } => {
                let path = path.unwrap_or_else(|| self.vault.root().to_path_buf());
                Ok(Response::Listing(self.index().directory_contents(&path)?))
            }

            Command::RescanVault => {
                let ctx = self.state.context();
                ctx.index.clear()?;
                let stats = scan_vault(&*ctx.fs, &*ctx.index, self.vault.root())?;
                Ok(Response::Scan(stats))
            }

            Command::TakeTreeRefresh => Ok(Response::Bool(self.state.take_tree_refresh())),
        }
    }
}
