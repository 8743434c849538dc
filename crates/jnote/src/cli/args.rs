//! Command-line argument structures and enums

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jnote")]
#[command(version)]
#[command(about = "Index, inspect and watch a vault of block-based notes", long_about = None)]
pub struct Cli {
    /// Config file to start from (the vault argument still wins)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite index file (default: in-memory index rebuilt on every run)
    #[arg(short, long, global = true)]
    pub index: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the vault and print what was indexed
    Scan {
        /// Vault root directory
        vault: PathBuf,
    },

    /// List every indexed note
    #[command(alias = "ls")]
    List {
        /// Vault root directory
        vault: PathBuf,
    },

    /// Print the folder tree below a directory
    Tree {
        /// Vault root directory
        vault: PathBuf,

        /// Directory to start from (default: the vault root)
        dir: Option<PathBuf>,
    },

    /// Create an empty note
    New {
        /// Vault root directory
        vault: PathBuf,

        /// Directory to create the note in, relative to the vault root
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Title for the note
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Append a block to a note and save it
    AddBlock {
        /// Vault root directory
        vault: PathBuf,

        /// Id of the note
        note_id: String,

        /// Block type (text, todo, code, image, latex)
        block_type: String,

        /// Block parameter as key=value; values that parse as JSON keep their type
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Insert after this block instead of at the end
        #[arg(long)]
        after: Option<String>,
    },

    /// Watch the vault and print events until stdin closes
    Watch {
        /// Vault root directory
        vault: PathBuf,
    },
}

/// Parse a `key=value` block parameter.
pub fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
