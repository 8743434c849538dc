//! `watch` command: keep the vault live and print events as JSON lines

use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;

use jnote_core::fs::VaultEvent;

use crate::cli::{ServiceOptions, finish};

/// Watch `vault` until stdin reaches end of file.
pub fn handle_watch(options: &ServiceOptions, vault: &Path) -> bool {
    let Some(service) = options.start(vault, true) else {
        return false;
    };

    service.subscribe(Arc::new(|event: &VaultEvent| match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => log::error!("Could not serialize event: {}", e),
    }));

    let scan = service.startup_scan();
    eprintln!(
        "✓ Watching {} ({} notes, {} directories). Close stdin to stop.",
        service.root().display(),
        scan.notes,
        scan.directories
    );

    for line in io::stdin().lock().lines() {
        if let Err(e) = line {
            eprintln!("⚠ Error reading stdin: {}", e);
            break;
        }
    }

    finish(service)
}
