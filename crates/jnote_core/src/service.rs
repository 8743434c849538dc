//! Vault service: explicit startup and shutdown of the whole core.
//!
//! Startup opens the index, scans the vault into it, builds the state manager
//! and (if configured) starts the watcher with the state manager as its
//! listener. Shutdown stops the watcher first, so no new reloads start, and
//! then closes every open note.

use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::active_note::NoteContext;
use crate::command::{Command, Response};
use crate::command_handler::CommandHandler;
use crate::config::Config;
use crate::error::{JnoteError, Result};
use crate::fs::{EventCallback, FileSystem, RealFileSystem, SubscriptionId};
use crate::index::{IndexStore, MemoryIndex, SqliteIndex};
use crate::state::StateManager;
use crate::vault::Vault;
use crate::watcher::{ScanStats, VaultEventHandler, VaultWatcher, scan_vault};

/// A running vault.
pub struct VaultService {
    config: Config,
    index: Arc<dyn IndexStore>,
    state: Arc<StateManager>,
    vault: Vault,
    handler: CommandHandler,
    events: Arc<VaultEventHandler>,
    watcher: Mutex<Option<VaultWatcher>>,
    scan: ScanStats,
}

impl VaultService {
    /// Start a service on the real filesystem.
    pub fn start(config: Config) -> Result<Self> {
        Self::start_with(config, Arc::new(RealFileSystem))
    }

    /// Start a service on the given filesystem.
    pub fn start_with(mut config: Config, fs: Arc<dyn FileSystem>) -> Result<Self> {
        let root = fs.canonicalize(&config.vault_root);
        if !fs.is_dir(&root) {
            return Err(JnoteError::DirectoryNotFound(root));
        }
        config.vault_root = root.clone();

        let index: Arc<dyn IndexStore> = match &config.index_path {
            Some(path) => {
                log::info!("Opening index at {}", path.display());
                Arc::new(SqliteIndex::open(path)?)
            }
            None => Arc::new(MemoryIndex::new()),
        };
        let scan = scan_vault(&*fs, &*index, &root)?;

        let ctx = NoteContext::new(&config, Arc::clone(&index), Arc::clone(&fs));
        let state = Arc::new(StateManager::new(ctx));
        let vault = Vault::new(root.clone(), Arc::clone(&fs), Arc::clone(&index));
        let handler = CommandHandler::new(Arc::clone(&state), vault.clone());

        let events = Arc::new(
            VaultEventHandler::new(root, Arc::clone(&index), fs).with_listener(state.listener()),
        );
        let watcher = if config.watch {
            Some(VaultWatcher::start(Arc::clone(&events))?)
        } else {
            None
        };

        log::info!("Vault service started for {}", config.vault_root.display());
        Ok(Self {
            config,
            index,
            state,
            vault,
            handler,
            events,
            watcher: Mutex::new(watcher),
            scan,
        })
    }

    /// Effective config (with the vault root resolved).
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Vault root.
    pub fn root(&self) -> &Path {
        self.vault.root()
    }

    /// The index.
    pub fn index(&self) -> &Arc<dyn IndexStore> {
        &self.index
    }

    /// The open-note registry.
    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Disk operations.
    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// The handler the watcher feeds; also usable to inject changes directly.
    pub fn event_handler(&self) -> &Arc<VaultEventHandler> {
        &self.events
    }

    /// Result of the startup scan.
    pub fn startup_scan(&self) -> ScanStats {
        self.scan
    }

    /// Whether the filesystem watcher is running.
    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(VaultWatcher::is_running)
    }

    /// Subscribe to outbound events.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        self.state.subscribe(callback)
    }

    /// Execute a command.
    pub fn execute(&self, command: Command) -> Result<Response> {
        self.handler.execute(command)
    }

    /// Stop the watcher and close every open note. Safe to call more than once.
    pub fn shutdown(&self) -> Result<()> {
        let watcher = self.watcher.lock().unwrap().take();
        if let Some(mut watcher) = watcher {
            watcher.stop();
        }
        self.state.close_all()
    }
}

impl Drop for VaultService {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Error while shutting down vault service: {}", e);
        }
    }
}

impl std::fmt::Debug for VaultService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService")
            .field("root", &self.config.vault_root)
            .field("watching", &self.is_watching())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(root: &Path) -> Config {
        let mut config = Config::new(root.to_path_buf());
        config.watch = false;
        config.debounce_ms = 20;
        config
    }

    #[test]
    fn test_start_requires_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = VaultService::start(config(&missing)).unwrap_err();
        assert!(matches!(err, JnoteError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_start_scans_vault() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Sub")).unwrap();
        let service = VaultService::start(config(dir.path())).unwrap();

        assert_eq!(
            service.startup_scan(),
            ScanStats {
                directories: 2,
                notes: 0
            }
        );
        assert!(!service.is_watching());
        assert_eq!(service.root(), dir.path().canonicalize().unwrap());
        service.shutdown().unwrap();
        service.shutdown().unwrap();
    }

    #[test]
    fn test_sqlite_index_persists_between_runs() {
        let dir = tempfile::tempdir().unwrap();
        let vault_dir = dir.path().join("vault");
        std::fs::create_dir(&vault_dir).unwrap();
        let mut cfg = config(&vault_dir);
        cfg.index_path = Some(dir.path().join("index.db"));

        let id = {
            let service = VaultService::start(cfg.clone()).unwrap();
            let created = service.vault().create_note(service.root(), "Kept").unwrap();
            created.note_id
        };

        let service = VaultService::start(cfg).unwrap();
        assert_eq!(service.index().get_note(&id).unwrap().unwrap().title, "Kept");
    }

    #[test]
    fn test_watcher_starts_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.watch = true;
        let service = VaultService::start(cfg).unwrap();
        assert!(service.is_watching());
        service.shutdown().unwrap();
        assert!(!service.is_watching());
    }
}
