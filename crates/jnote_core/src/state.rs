//! Open-note registry and change routing.
//!
//! The [`StateManager`] owns every [`ActiveNote`] in the process, at most one
//! per note id. Change notifications from the watcher are routed here: a path
//! that belongs to an open note goes to that note, anything else means the
//! navigation tree is out of date.
//!
//! Directory renames and deletes change where open notes live. Renames
//! re-point them through [`StateManager::refresh_paths`]; deletes close them
//! through [`StateManager::close_within`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::active_note::{ActiveNote, ExternalChange, NoteContext};
use crate::error::{JnoteError, Result};
use crate::fs::{EventCallback, SubscriptionId, VaultEvent};
use crate::path_utils::{is_within, path_key};
use crate::watcher::ChangeListener;

/// Structural-change flag for the navigation tree.
#[derive(Debug, Default)]
pub struct FileTree {
    needs_refresh: AtomicBool,
}

impl FileTree {
    /// Record that the tree changed.
    pub fn mark_changed(&self) {
        self.needs_refresh.store(true, Ordering::SeqCst);
    }

    /// Whether a refresh is pending.
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh.load(Ordering::SeqCst)
    }

    /// Read and clear the flag.
    pub fn take_refresh(&self) -> bool {
        self.needs_refresh.swap(false, Ordering::SeqCst)
    }
}

/// Registry of open notes.
pub struct StateManager {
    ctx: NoteContext,
    notes: RwLock<HashMap<String, ActiveNote>>,
    tree: FileTree,
}

impl StateManager {
    /// Create an empty registry. Notes are opened with `ctx`.
    pub fn new(ctx: NoteContext) -> Self {
        Self {
            ctx,
            notes: RwLock::new(HashMap::new()),
            tree: FileTree::default(),
        }
    }

    /// Shared services handed to every note.
    pub fn context(&self) -> &NoteContext {
        &self.ctx
    }

    /// Subscribe to outbound events.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        self.ctx.events.subscribe(callback)
    }

    /// Remove an event subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.ctx.events.unsubscribe(id)
    }

    /// Return the open instance for `note_id`, opening it if needed.
    pub fn open(&self, note_id: &str) -> Result<ActiveNote> {
        {
            let notes = self.notes.read().unwrap();
            if let Some(note) = notes.get(note_id)
                && !note.is_closed()
            {
                return Ok(note.clone());
            }
        }

        let mut notes = self.notes.write().unwrap();
        // Another caller may have opened it between the two locks.
        if let Some(note) = notes.get(note_id)
            && !note.is_closed()
        {
            return Ok(note.clone());
        }

        match ActiveNote::open(note_id, &self.ctx) {
            Ok(note) => {
                notes.insert(note_id.to_string(), note.clone());
                log::info!("Opened note {}", note_id);
                Ok(note)
            }
            Err(e) => {
                log::error!("Failed to open note {}: {}", note_id, e);
                Err(e)
            }
        }
    }

    /// The open instance for `note_id`, if any.
    pub fn get(&self, note_id: &str) -> Option<ActiveNote> {
        self.notes
            .read()
            .unwrap()
            .get(note_id)
            .filter(|note| !note.is_closed())
            .cloned()
    }

    /// Like [`get`](Self::get) but fails with [`JnoteError::NoteNotOpen`].
    pub fn require(&self, note_id: &str) -> Result<ActiveNote> {
        self.get(note_id)
            .ok_or_else(|| JnoteError::NoteNotOpen(note_id.to_string()))
    }

    /// Close a note and drop it from the registry.
    ///
    /// The note stays registered while it flushes, so a concurrent `open` never
    /// creates a second instance. If the flush fails it stays registered.
    pub fn close(&self, note_id: &str) -> Result<()> {
        let note = self
            .notes
            .read()
            .unwrap()
            .get(note_id)
            .cloned()
            .ok_or_else(|| JnoteError::NoteNotOpen(note_id.to_string()))?;

        note.close()?;

        let mut notes = self.notes.write().unwrap();
        if notes
            .get(note_id)
            .is_some_and(|current| current.same_instance(&note))
        {
            notes.remove(note_id);
        }
        log::info!("Closed note {}", note_id);
        Ok(())
    }

    /// Close every open note. Returns the first error after attempting all of them.
    pub fn close_all(&self) -> Result<()> {
        let mut first_error = None;
        for note_id in self.open_notes() {
            if let Err(e) = self.close(&note_id) {
                log::error!("Failed to close note {}: {}", note_id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every open note inside `dir`, which was deleted.
    ///
    /// Pending edits of those notes are discarded. Returns the ids closed.
    pub fn close_within(&self, dir: &Path) -> Vec<String> {
        let dir_key = path_key(dir);
        let mut closed = Vec::new();
        for note in self.open_instances() {
            if !is_within(&path_key(&note.path()), &dir_key) {
                continue;
            }
            match self.close(note.id()) {
                Ok(()) => closed.push(note.id().to_string()),
                Err(e) => log::error!("Failed to close note {}: {}", note.id(), e),
            }
        }
        closed.sort();
        closed
    }

    /// Re-read the location of every open note from the index.
    ///
    /// Returns how many notes moved.
    pub fn refresh_paths(&self) -> usize {
        let mut moved = 0;
        for note in self.open_instances() {
            match note.refresh_path() {
                Ok(true) => moved += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Could not resolve path of note {}: {}", note.id(), e),
            }
        }
        moved
    }

    fn open_instances(&self) -> Vec<ActiveNote> {
        self.notes
            .read()
            .unwrap()
            .values()
            .filter(|note| !note.is_closed())
            .cloned()
            .collect()
    }

    /// Ids of open notes, sorted.
    pub fn open_notes(&self) -> Vec<String> {
        let notes = self.notes.read().unwrap();
        let mut ids: Vec<String> = notes
            .iter()
            .filter(|(_, note)| !note.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether `note_id` is open.
    pub fn is_open(&self, note_id: &str) -> bool {
        self.get(note_id).is_some()
    }

    /// Navigation-tree flag.
    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    /// Whether the navigation tree should be reloaded.
    pub fn tree_needs_refresh(&self) -> bool {
        self.tree.needs_refresh()
    }

    /// Read and clear the navigation-tree flag.
    pub fn take_tree_refresh(&self) -> bool {
        self.tree.take_refresh()
    }

    /// Route a change notification.
    ///
    /// The first open note whose path matches handles it. If none matches,
    /// open notes are re-pointed from the index (a directory may have been
    /// renamed since they last saved) and the lookup is tried once more.
    /// Otherwise the tree is marked for refresh and a
    /// [`VaultEvent::TreeChanged`] is emitted.
    pub fn route(&self, path: &Path, mtime: f64) {
        if self.deliver(path, mtime) {
            return;
        }
        if self.refresh_paths() > 0 && self.deliver(path, mtime) {
            return;
        }
        log::debug!("Tree changed at {}", path.display());
        self.tree.mark_changed();
        self.ctx.events.emit(&VaultEvent::tree_changed(path.to_path_buf()));
    }

    /// Hand a notification to the open note it belongs to. Returns `false` if
    /// no open note claims the path.
    fn deliver(&self, path: &Path, mtime: f64) -> bool {
        for note in self.open_instances() {
            match note.handle_external_update(path, mtime) {
                Ok(ExternalChange::Ignored) => continue,
                Ok(ExternalChange::Echo | ExternalChange::Skipped) => return true,
                // Fire-and-forget: the reload reports through events.
                Ok(ExternalChange::Reloading(_)) => return true,
                Err(e) => {
                    log::error!("Could not start reload of note {}: {}", note.id(), e);
                    return true;
                }
            }
        }
        false
    }

    /// A watcher listener that routes into this manager.
    ///
    /// Holds only a weak reference, so the watcher never keeps the state alive.
    pub fn listener(self: &Arc<Self>) -> ChangeListener {
        let weak = Arc::downgrade(self);
        Arc::new(move |path: &Path, mtime: f64| {
            if let Some(state) = weak.upgrade() {
                state.route(path, mtime);
            }
        })
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("open_notes", &self.open_notes())
            .field("tree_needs_refresh", &self.tree_needs_refresh())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockParams;
    use crate::index::IndexStore;
    use crate::test_utils::TestVault;
    use std::sync::Mutex;
    use std::time::Duration;

    fn manager(vault: &TestVault) -> Arc<StateManager> {
        Arc::new(StateManager::new(vault.ctx.clone()))
    }

    fn record_events(state: &StateManager) -> Arc<Mutex<Vec<VaultEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        state.subscribe(Arc::new(move |event: &VaultEvent| {
            events_clone.lock().unwrap().push(event.clone());
        }));
        events
    }

    #[test]
    fn test_open_returns_single_instance() {
        let vault = TestVault::new(10_000);
        let (id, _) = vault.add_note("Once", vec![]);
        let state = manager(&vault);

        let a = state.open(&id).unwrap();
        let b = state.open(&id).unwrap();
        assert!(a.same_instance(&b));
        assert_eq!(state.open_notes(), vec![id.clone()]);

        a.add_block("text", &BlockParams::new(), None).unwrap();
        assert_eq!(b.blocks().len(), 1);
        state.close_all().unwrap();
    }

    #[test]
    fn test_concurrent_opens_share_instance() {
        let vault = TestVault::new(10_000);
        let (id, _) = vault.add_note("Contended", vec![]);
        let state = manager(&vault);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                let id = id.clone();
                std::thread::spawn(move || state.open(&id).unwrap())
            })
            .collect();
        let notes: Vec<ActiveNote> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(notes.windows(2).all(|w| w[0].same_instance(&w[1])));
        state.close_all().unwrap();
    }

    #[test]
    fn test_open_failure_is_reported() {
        let vault = TestVault::new(10_000);
        let state = manager(&vault);
        assert!(matches!(state.open("ghost"), Err(JnoteError::NotIndexed(_))));
        assert!(state.open_notes().is_empty());
    }

    #[test]
    fn test_close_removes_and_flushes() {
        let vault = TestVault::new(10_000);
        let (id, _) = vault.add_note("Bye", vec![]);
        let state = manager(&vault);

        let note = state.open(&id).unwrap();
        note.add_block("text", &BlockParams::new(), None).unwrap();
        state.close(&id).unwrap();

        assert!(!state.is_open(&id));
        assert_eq!(vault.fs.write_count(), 1);
        assert!(matches!(state.close(&id), Err(JnoteError::NoteNotOpen(_))));

        let reopened = state.open(&id).unwrap();
        assert!(!reopened.same_instance(&note));
        assert_eq!(reopened.blocks().len(), 1);
        state.close_all().unwrap();
    }

    #[test]
    fn test_route_unknown_path_marks_tree() {
        let vault = TestVault::new(10_000);
        let state = manager(&vault);
        let events = record_events(&state);

        let dir = vault.root().join("NewFolder");
        state.route(&dir, 1.0);

        assert!(state.tree_needs_refresh());
        assert!(state.take_tree_refresh());
        assert!(!state.tree_needs_refresh());
        assert_eq!(*events.lock().unwrap(), vec![VaultEvent::tree_changed(dir)]);
    }

    #[test]
    fn test_route_echo_does_not_touch_tree() {
        let vault = TestVault::new(10_000);
        let (id, path) = vault.add_note("Quiet", vec![]);
        let state = manager(&vault);

        let note = state.open(&id).unwrap();
        note.add_block("text", &BlockParams::new(), None).unwrap();
        note.flush().unwrap();
        let events = record_events(&state);

        state.route(&path, note.echo_watermark());
        assert!(!state.tree_needs_refresh());
        assert!(events.lock().unwrap().is_empty());
        assert_eq!(note.blocks().len(), 1);
        state.close_all().unwrap();
    }

    #[test]
    fn test_route_external_change_reloads() {
        let vault = TestVault::new(10_000);
        let (id, path) = vault.add_note("Shared", vec![]);
        let state = manager(&vault);
        let note = state.open(&id).unwrap();
        let events = record_events(&state);

        let mut external = note.document();
        external.metadata.title = "Edited elsewhere".to_string();
        vault.write_external(&path, &external);
        state.route(&path, note.echo_watermark() + 30.0);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while note.document().metadata.title != "Edited elsewhere" {
            assert!(std::time::Instant::now() < deadline, "reload never applied");
            std::thread::sleep(Duration::from_millis(10));
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(!state.tree_needs_refresh());
        assert!(
            events
                .lock()
                .unwrap()
                .contains(&VaultEvent::note_reloaded(&id, path.clone()))
        );
        state.close_all().unwrap();
    }

    #[test]
    fn test_route_follows_renamed_directory() {
        let vault = TestVault::new(10_000);
        let work = vault.root().join("Work");
        let (id, _) = vault.add_note_in(&work, "Moving", vec![]);
        let state = manager(&vault);
        let note = state.open(&id).unwrap();

        let done = vault.root().join("Done");
        std::fs::rename(&work, &done).unwrap();
        vault.index.rename_directory_subtree(&work, &done, "Done").unwrap();
        let events = record_events(&state);

        let new_path = crate::index::note_file_path(&done, &id);
        state.route(&new_path, note.echo_watermark());
        assert_eq!(note.path(), new_path);
        assert!(!state.tree_needs_refresh());
        assert!(events.lock().unwrap().is_empty());
        state.close_all().unwrap();
    }

    #[test]
    fn test_refresh_paths_counts_moved_notes() {
        let vault = TestVault::new(10_000);
        let work = vault.root().join("Work");
        let (moving, _) = vault.add_note_in(&work, "Moving", vec![]);
        let (staying, staying_path) = vault.add_note("Staying", vec![]);
        let state = manager(&vault);
        state.open(&moving).unwrap();
        let stay = state.open(&staying).unwrap();
        assert_eq!(state.refresh_paths(), 0);

        let done = vault.root().join("Done");
        std::fs::rename(&work, &done).unwrap();
        vault.index.rename_directory_subtree(&work, &done, "Done").unwrap();

        assert_eq!(state.refresh_paths(), 1);
        assert_eq!(stay.path(), staying_path);
        state.close_all().unwrap();
    }

    #[test]
    fn test_close_within_only_closes_subtree() {
        let vault = TestVault::new(10_000);
        let trash = vault.root().join("Trash");
        let (inside, _) = vault.add_note_in(&trash, "Inside", vec![]);
        let trashcan = vault.root().join("Trashcan");
        let (sibling, sibling_path) = vault.add_note_in(&trashcan, "Sibling", vec![]);
        let state = manager(&vault);
        state
            .open(&inside)
            .unwrap()
            .add_block("text", &BlockParams::new(), None)
            .unwrap();
        state
            .open(&sibling)
            .unwrap()
            .add_block("text", &BlockParams::new(), None)
            .unwrap();

        std::fs::remove_dir_all(&trash).unwrap();
        vault.index.delete_directory_subtree(&trash).unwrap();

        assert_eq!(state.close_within(&trash), vec![inside.clone()]);
        assert!(!state.is_open(&inside));
        assert!(!trash.exists());
        assert!(state.is_open(&sibling));

        state.close_all().unwrap();
        assert_eq!(vault.fs.write_count(), 1);
        assert!(sibling_path.exists());
    }

    #[test]
    fn test_listener_does_not_keep_state_alive() {
        let vault = TestVault::new(10_000);
        let state = manager(&vault);
        let listener = state.listener();
        drop(state);
        listener(vault.root(), 1.0);
    }
}
