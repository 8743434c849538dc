//! `jnote` - index, inspect and watch a vault of block-based notes.

/// CLI module - command-line interface for jnote
mod cli;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    cli::run_cli();
}
