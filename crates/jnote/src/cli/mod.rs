/// Clap argument definitions
mod args;

/// `scan`, `list`, `tree`, `new` and `add-block` commands
mod vault;

/// `watch` command
mod watch;

use clap::Parser;
use std::path::{Path, PathBuf};

use jnote_core::config::Config;
use jnote_core::error::Result;
use jnote_core::fs::RealFileSystem;
use jnote_core::service::VaultService;

pub use args::Cli;
use args::Commands;

/// Main entry point for the CLI
pub fn run_cli() {
    let cli = Cli::parse();
    let options = ServiceOptions {
        config: cli.config,
        index: cli.index,
    };

    let success = match cli.command {
        Commands::Scan { vault } => vault::handle_scan(&options, &vault),

        Commands::List { vault } => vault::handle_list(&options, &vault),

        Commands::Tree { vault, dir } => vault::handle_tree(&options, &vault, dir.as_deref()),

        Commands::New { vault, dir, title } => {
            vault::handle_new(&options, &vault, dir.as_deref(), title)
        }

        Commands::AddBlock {
            vault,
            note_id,
            block_type,
            params,
            after,
        } => vault::handle_add_block(&options, &vault, note_id, block_type, params, after),

        Commands::Watch { vault } => watch::handle_watch(&options, &vault),
    };

    if !success {
        std::process::exit(1);
    }
}

/// Global options shared by every command.
pub struct ServiceOptions {
    config: Option<PathBuf>,
    index: Option<PathBuf>,
}

impl ServiceOptions {
    /// Build the service config for `vault`.
    fn config_for(&self, vault: &Path, watch: bool) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(&RealFileSystem, path)?,
            None => Config::new(vault.to_path_buf()),
        };
        config.vault_root = vault.to_path_buf();
        if self.index.is_some() {
            config.index_path = self.index.clone();
        }
        config.watch = watch;
        Ok(config)
    }

    /// Start a service for `vault`, reporting failures on stderr.
    fn start(&self, vault: &Path, watch: bool) -> Option<VaultService> {
        match self
            .config_for(vault, watch)
            .and_then(VaultService::start)
        {
            Ok(service) => Some(service),
            Err(e) => {
                eprintln!("✗ Could not open vault '{}': {}", vault.display(), e);
                None
            }
        }
    }
}

/// Shut the service down, reporting failures on stderr.
fn finish(service: VaultService) -> bool {
    match service.shutdown() {
        Ok(()) => true,
        Err(e) => {
            eprintln!("✗ Error while closing notes: {}", e);
            false
        }
    }
}
